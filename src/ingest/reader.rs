//! Streaming record reader for PubChem XML
//!
//! Walks the document with quick-xml's pull parser and yields one [`Record`]
//! per `PC-Compound` / `PC-Substance` element. All parsing state (element
//! stack, record under construction) lives in the reader, so every document
//! gets its own context.
//!
//! Compound layout:
//! ```text
//! PC-Compounds/PC-Compound
//!   PC-Compound_id/…/PC-CompoundType_id_cid          → identifier
//!   PC-Compound_props/PC-InfoData
//!     PC-InfoData_urn/PC-Urn/PC-Urn_label           → "SMILES" | "IUPAC Name" | …
//!     PC-InfoData_value/PC-InfoData_value_sval      → name
//! ```
//!
//! Substance layout:
//! ```text
//! PC-Substances/PC-Substance
//!   PC-Substance_sid/PC-ID/PC-ID_id                  → identifier
//!   PC-Substance_synonyms/PC-Substance_synonyms_E    → name
//! ```

use super::{IngestionError, Record};
use crate::index::RecordKind;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;

/// Property labels whose string values are indexed as compound names
const NAME_LABELS: [&str; 2] = ["SMILES", "IUPAC Name"];

/// Element names that delimit records of one kind
struct Layout {
    container: &'static str,
    record: &'static str,
    id_scope: &'static str,
    id_leaf: &'static str,
}

const COMPOUND_LAYOUT: Layout = Layout {
    container: "PC-Compounds",
    record: "PC-Compound",
    id_scope: "PC-Compound_id",
    id_leaf: "PC-CompoundType_id_cid",
};

const SUBSTANCE_LAYOUT: Layout = Layout {
    container: "PC-Substances",
    record: "PC-Substance",
    id_scope: "PC-Substance_sid",
    id_leaf: "PC-ID_id",
};

/// Record under construction
#[derive(Debug, Default)]
struct PendingRecord {
    /// Element stack depth including the record element
    depth: usize,
    identifier: Option<String>,
    names: Vec<String>,
    info: Option<InfoData>,
}

/// One `PC-InfoData` property being read
#[derive(Debug, Default)]
struct InfoData {
    label: Option<String>,
    value: Option<String>,
}

enum Step {
    Start(String),
    Empty(String),
    End(String),
    Text(String),
    Eof,
    Skip,
    Error(quick_xml::Error),
}

/// Pull-based reader yielding [`Record`]s from one document
pub struct RecordReader<R: BufRead> {
    xml: Reader<R>,
    buf: Vec<u8>,
    kind: RecordKind,
    layout: &'static Layout,
    stack: Vec<String>,
    text: String,
    root_seen: bool,
    current: Option<PendingRecord>,
    ordinal: usize,
    finished: bool,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(source: R, kind: RecordKind) -> Self {
        let layout = match kind {
            RecordKind::Compound => &COMPOUND_LAYOUT,
            RecordKind::Substance => &SUBSTANCE_LAYOUT,
        };

        Self {
            xml: Reader::from_reader(source),
            buf: Vec::new(),
            kind,
            layout,
            stack: Vec::new(),
            text: String::new(),
            root_seen: false,
            current: None,
            ordinal: 0,
            finished: false,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    /// Read the next record, or `None` at the end of the document
    pub fn next_record(&mut self) -> Result<Option<Record>, IngestionError> {
        loop {
            let step = match self.xml.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) => Step::Start(String::from_utf8_lossy(e.local_name().as_ref()).into_owned()),
                Ok(Event::Empty(e)) => Step::Empty(String::from_utf8_lossy(e.local_name().as_ref()).into_owned()),
                Ok(Event::End(e)) => Step::End(String::from_utf8_lossy(e.local_name().as_ref()).into_owned()),
                Ok(Event::Text(t)) => match t.unescape() {
                    Ok(text) => Step::Text(text.into_owned()),
                    Err(e) => Step::Error(e),
                },
                Ok(Event::CData(c)) => Step::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()),
                Ok(Event::Eof) => Step::Eof,
                Ok(_) => Step::Skip,
                Err(e) => Step::Error(e),
            };
            self.buf.clear();

            match step {
                Step::Start(name) => self.start(name)?,
                Step::Empty(name) => {
                    self.start(name.clone())?;
                    if let Some(record) = self.end(&name)? {
                        return Ok(Some(record));
                    }
                }
                Step::End(name) => {
                    if let Some(record) = self.end(&name)? {
                        return Ok(Some(record));
                    }
                }
                Step::Text(text) => self.text.push_str(&text),
                Step::Skip => {}
                Step::Eof => return self.eof(),
                Step::Error(e) => return Err(self.xml_error(e.to_string())),
            }
        }
    }

    fn start(&mut self, name: String) -> Result<(), IngestionError> {
        if !self.root_seen {
            if name != self.layout.container {
                return Err(IngestionError::UnexpectedRoot {
                    expected: self.layout.container.to_string(),
                    found: name,
                });
            }
            self.root_seen = true;
        }

        self.stack.push(name);
        self.text.clear();

        let name = self.stack.last().map(String::as_str).unwrap_or_default();

        if self.current.is_none() && name == self.layout.record {
            self.current = Some(PendingRecord {
                depth: self.stack.len(),
                ..Default::default()
            });
            return Ok(());
        }

        if self.kind == RecordKind::Compound
            && name == "PC-InfoData"
            && self.within("PC-Compound_props")
        {
            if let Some(pending) = self.current.as_mut() {
                pending.info = Some(InfoData::default());
            }
        }

        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<Option<Record>, IngestionError> {
        let text = std::mem::take(&mut self.text);
        let mut finished = None;

        if let Some(depth) = self.current.as_ref().map(|pending| pending.depth) {
            if name == self.layout.record && self.stack.len() == depth {
                finished = self.current.take();
            } else {
                self.collect_field(name, text);
            }
        }

        self.stack.pop();

        match finished {
            Some(pending) => self.finish(pending).map(Some),
            None => Ok(None),
        }
    }

    /// Route the text of a closing leaf element into the pending record
    fn collect_field(&mut self, name: &str, text: String) {
        let in_id_scope = name == self.layout.id_leaf && self.within(self.layout.id_scope);
        let in_synonyms = self.kind == RecordKind::Substance
            && name == "PC-Substance_synonyms_E"
            && self.within("PC-Substance_synonyms");

        let Some(pending) = self.current.as_mut() else {
            return;
        };

        if in_id_scope {
            if pending.identifier.is_none() {
                pending.identifier = Some(text);
            }
            return;
        }

        if in_synonyms {
            pending.names.push(text);
            return;
        }

        match name {
            "PC-Urn_label" => {
                if let Some(info) = pending.info.as_mut() {
                    info.label.get_or_insert(text);
                }
            }
            "PC-InfoData_value_sval" => {
                if let Some(info) = pending.info.as_mut() {
                    info.value.get_or_insert(text);
                }
            }
            "PC-InfoData" => {
                if let Some(InfoData {
                    label: Some(label),
                    value: Some(value),
                }) = pending.info.take()
                {
                    if NAME_LABELS.contains(&label.as_str()) {
                        pending.names.push(value);
                    }
                }
            }
            _ => {}
        }
    }

    fn finish(&mut self, pending: PendingRecord) -> Result<Record, IngestionError> {
        self.ordinal += 1;

        let raw = pending.identifier.ok_or(IngestionError::MissingIdentifier {
            kind: self.kind,
            ordinal: self.ordinal,
        })?;

        let identifier = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| IngestionError::InvalidIdentifier {
                kind: self.kind,
                ordinal: self.ordinal,
                value: raw.clone(),
            })?;

        Ok(Record {
            kind: self.kind,
            identifier,
            names: pending.names.into_iter().filter(|name| !name.is_empty()).collect(),
        })
    }

    fn eof(&mut self) -> Result<Option<Record>, IngestionError> {
        if !self.root_seen {
            return Err(IngestionError::UnexpectedRoot {
                expected: self.layout.container.to_string(),
                found: "end of document".to_string(),
            });
        }
        if self.current.is_some() || !self.stack.is_empty() {
            return Err(self.xml_error("document ended inside an open element".to_string()));
        }
        Ok(None)
    }

    /// Whether an element named `name` is open below the current record
    fn within(&self, name: &str) -> bool {
        let Some(pending) = self.current.as_ref() else {
            return false;
        };
        self.stack
            .get(pending.depth..)
            .is_some_and(|open| open.iter().any(|element| element == name))
    }

    fn xml_error(&self, message: String) -> IngestionError {
        IngestionError::Xml {
            position: self.xml.buffer_position(),
            message,
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, IngestionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(xml: &str, kind: RecordKind) -> Result<Vec<Record>, IngestionError> {
        RecordReader::new(xml.as_bytes(), kind).collect()
    }

    const COMPOUNDS: &str = r#"<?xml version="1.0"?>
<!DOCTYPE PC-Compounds PUBLIC "-//NCBI//NCBI PCSubstance/EN" "NCBI_PCSubstance.dtd">
<PC-Compounds xmlns="http://www.ncbi.nlm.nih.gov">
  <PC-Compound>
    <PC-Compound_id>
      <PC-CompoundType>
        <PC-CompoundType_id>
          <PC-CompoundType_id_cid>2245</PC-CompoundType_id_cid>
        </PC-CompoundType_id>
      </PC-CompoundType>
    </PC-Compound_id>
    <PC-Compound_props>
      <PC-InfoData>
        <PC-InfoData_urn>
          <PC-Urn>
            <PC-Urn_label>IUPAC Name</PC-Urn_label>
            <PC-Urn_name>Preferred</PC-Urn_name>
          </PC-Urn>
        </PC-InfoData_urn>
        <PC-InfoData_value>
          <PC-InfoData_value_sval>4-methoxy-1H-indole-3-carbaldehyde</PC-InfoData_value_sval>
        </PC-InfoData_value>
      </PC-InfoData>
      <PC-InfoData>
        <PC-InfoData_urn>
          <PC-Urn>
            <PC-Urn_label>Molecular Formula</PC-Urn_label>
          </PC-Urn>
        </PC-InfoData_urn>
        <PC-InfoData_value>
          <PC-InfoData_value_sval>C10H9NO2</PC-InfoData_value_sval>
        </PC-InfoData_value>
      </PC-InfoData>
      <PC-InfoData>
        <PC-InfoData_urn>
          <PC-Urn>
            <PC-Urn_label>SMILES</PC-Urn_label>
            <PC-Urn_name>Canonical</PC-Urn_name>
          </PC-Urn>
        </PC-InfoData_urn>
        <PC-InfoData_value>
          <PC-InfoData_value_sval>COC1=CC=CC2=C1C(=CN2)C=O</PC-InfoData_value_sval>
        </PC-InfoData_value>
      </PC-InfoData>
      <PC-InfoData>
        <PC-InfoData_urn>
          <PC-Urn>
            <PC-Urn_label>Mass</PC-Urn_label>
          </PC-Urn>
        </PC-InfoData_urn>
        <PC-InfoData_value>
          <PC-InfoData_value_fval>175.063</PC-InfoData_value_fval>
        </PC-InfoData_value>
      </PC-InfoData>
    </PC-Compound_props>
  </PC-Compound>
  <PC-Compound>
    <PC-Compound_id><PC-CompoundType><PC-CompoundType_id><PC-CompoundType_id_cid>887</PC-CompoundType_id_cid></PC-CompoundType_id></PC-CompoundType></PC-Compound_id>
    <PC-Compound_props>
      <PC-InfoData>
        <PC-InfoData_urn><PC-Urn><PC-Urn_label>IUPAC Name</PC-Urn_label></PC-Urn></PC-InfoData_urn>
        <PC-InfoData_value><PC-InfoData_value_sval>methanol</PC-InfoData_value_sval></PC-InfoData_value>
      </PC-InfoData>
    </PC-Compound_props>
  </PC-Compound>
</PC-Compounds>"#;

    const SUBSTANCES: &str = r#"<?xml version="1.0"?>
<PC-Substances>
  <PC-Substance>
    <PC-Substance_sid>
      <PC-ID>
        <PC-ID_id>134</PC-ID_id>
        <PC-ID_version>7</PC-ID_version>
      </PC-ID>
    </PC-Substance_sid>
    <PC-Substance_synonyms>
      <PC-Substance_synonyms_E>aspirin</PC-Substance_synonyms_E>
      <PC-Substance_synonyms_E>Acetylsalicylic acid</PC-Substance_synonyms_E>
      <PC-Substance_synonyms_E></PC-Substance_synonyms_E>
      <PC-Substance_synonyms_E>Salicylic acid &amp; acetate ester</PC-Substance_synonyms_E>
    </PC-Substance_synonyms>
    <PC-Substance_compound>
      <PC-Compounds>
        <PC-Compound>
          <PC-Compound_id><PC-CompoundType><PC-CompoundType_id><PC-CompoundType_id_cid>2244</PC-CompoundType_id_cid></PC-CompoundType_id></PC-CompoundType></PC-Compound_id>
        </PC-Compound>
      </PC-Compounds>
    </PC-Substance_compound>
  </PC-Substance>
  <PC-Substance>
    <PC-Substance_sid><PC-ID><PC-ID_id>135</PC-ID_id></PC-ID></PC-Substance_sid>
  </PC-Substance>
</PC-Substances>"#;

    #[test]
    fn test_compound_records() {
        let records = read_all(COMPOUNDS, RecordKind::Compound).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].kind, RecordKind::Compound);
        assert_eq!(records[0].identifier, 2245);
        assert_eq!(
            records[0].names,
            vec!["4-methoxy-1H-indole-3-carbaldehyde", "COC1=CC=CC2=C1C(=CN2)C=O"]
        );

        assert_eq!(records[1].identifier, 887);
        assert_eq!(records[1].names, vec!["methanol"]);
    }

    #[test]
    fn test_substance_records() {
        let records = read_all(SUBSTANCES, RecordKind::Substance).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].identifier, 134);
        assert_eq!(
            records[0].names,
            vec!["aspirin", "Acetylsalicylic acid", "Salicylic acid & acetate ester"]
        );

        assert_eq!(records[1].identifier, 135);
        assert!(records[1].names.is_empty());
    }

    #[test]
    fn test_nested_compound_does_not_replace_substance_id() {
        let records = read_all(SUBSTANCES, RecordKind::Substance).unwrap();
        assert!(records.iter().all(|r| r.identifier != 2244));
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        let err = read_all(SUBSTANCES, RecordKind::Compound).unwrap_err();
        match err {
            IngestionError::UnexpectedRoot { expected, found } => {
                assert_eq!(expected, "PC-Compounds");
                assert_eq!(found, "PC-Substances");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_identifier() {
        let xml = "<PC-Substances><PC-Substance><PC-Substance_synonyms><PC-Substance_synonyms_E>x</PC-Substance_synonyms_E></PC-Substance_synonyms></PC-Substance></PC-Substances>";
        let err = read_all(xml, RecordKind::Substance).unwrap_err();
        assert!(matches!(err, IngestionError::MissingIdentifier { ordinal: 1, .. }));
    }

    #[test]
    fn test_empty_record_element() {
        let xml = "<PC-Substances><PC-Substance/></PC-Substances>";
        let err = read_all(xml, RecordKind::Substance).unwrap_err();
        assert!(matches!(err, IngestionError::MissingIdentifier { .. }));
    }

    #[test]
    fn test_empty_container() {
        let records = read_all("<PC-Compounds/>", RecordKind::Compound).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_empty_document() {
        let err = read_all("", RecordKind::Compound).unwrap_err();
        assert!(matches!(err, IngestionError::UnexpectedRoot { .. }));
    }

    #[test]
    fn test_mismatched_tags() {
        let xml = "<PC-Compounds><PC-Compound></PC-Substance></PC-Compounds>";
        let err = read_all(xml, RecordKind::Compound).unwrap_err();
        assert!(matches!(err, IngestionError::Xml { .. }));
    }

    #[test]
    fn test_truncated_document() {
        let xml = "<PC-Compounds><PC-Compound><PC-Compound_id>";
        let err = read_all(xml, RecordKind::Compound).unwrap_err();
        assert!(matches!(err, IngestionError::Xml { .. }));
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let xml = "<PC-Substances><PC-Substance/><PC-Substance/></PC-Substances>";
        let mut reader = RecordReader::new(xml.as_bytes(), RecordKind::Substance);
        assert!(matches!(reader.next(), Some(Err(_))));
        assert!(reader.next().is_none());
    }
}
