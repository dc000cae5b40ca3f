//! Readers for raw document collections.

use std::io::BufRead;

use quick_xml::events::Event;

use crate::errors::{IetkError, Result};

/// A document from a gigaword SGML file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GigawordDocument {
    pub id: String,
    pub doc_type: String,
    pub headline: String,
    pub dateline: String,
    pub text: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Zone {
    Headline,
    Dateline,
    Text,
    None,
}

/// Reads `<DOC>` records one by one.
pub struct GigawordReader<R> {
    rdr: quick_xml::Reader<R>,
    buf: Vec<u8>,
}

impl<R> GigawordReader<R>
where
    R: BufRead,
{
    pub fn new(rdr: R) -> Self {
        let mut rdr = quick_xml::Reader::from_reader(rdr);
        rdr.check_end_names(false);
        Self { rdr, buf: vec![] }
    }

    fn read_document(&mut self) -> Result<Option<GigawordDocument>> {
        let mut doc: Option<GigawordDocument> = None;
        let mut zone = Zone::None;
        loop {
            self.buf.clear();
            let event = self
                .rdr
                .read_event_into(&mut self.buf)
                .map_err(|e| IetkError::invalid_argument("rdr", e.to_string()))?;
            match event {
                Event::Start(e) => match e.name().as_ref() {
                    b"DOC" => {
                        let mut d = GigawordDocument::default();
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).trim().to_string();
                            match attr.key.as_ref() {
                                b"id" => d.id = value,
                                b"type" => d.doc_type = value,
                                _ => {}
                            }
                        }
                        doc = Some(d);
                    }
                    b"HEADLINE" => zone = Zone::Headline,
                    b"DATELINE" => zone = Zone::Dateline,
                    b"TEXT" => zone = Zone::Text,
                    _ => {}
                },
                Event::End(e) => match e.name().as_ref() {
                    b"DOC" => {
                        if let Some(d) = doc.take() {
                            return Ok(Some(d));
                        }
                    }
                    b"HEADLINE" | b"DATELINE" | b"TEXT" => zone = Zone::None,
                    _ => {}
                },
                Event::Text(e) => {
                    // Gigaword uses uppercase entity names that are not valid XML.
                    let text = match e.unescape() {
                        Ok(t) => t.into_owned(),
                        Err(_) => String::from_utf8_lossy(&e).replace("&AMP;", "&"),
                    };
                    if let Some(d) = doc.as_mut() {
                        let target = match zone {
                            Zone::Headline => &mut d.headline,
                            Zone::Dateline => &mut d.dateline,
                            Zone::Text => &mut d.text,
                            Zone::None => continue,
                        };
                        let text = text.trim();
                        if !text.is_empty() {
                            if !target.is_empty() {
                                target.push(' ');
                            }
                            target.push_str(text);
                        }
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }
}

impl<R> Iterator for GigawordReader<R>
where
    R: BufRead,
{
    type Item = Result<GigawordDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_document().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = r#"<DOC id="AFP_ENG_20090101.0001" type="story" >
<HEADLINE>
Fireworks in Sydney
</HEADLINE>
<DATELINE>
SYDNEY, Jan 1
</DATELINE>
<TEXT>
<P>
Crowds gathered at the harbour.
</P>
<P>
Police said R&amp;D was fine.
</P>
</TEXT>
</DOC>
<DOC id="AFP_ENG_20090101.0002" type="advis" >
<TEXT>
Second document.
</TEXT>
</DOC>
"#;

    #[test]
    fn test_read_documents() {
        let docs: Vec<_> = GigawordReader::new(DATA.as_bytes())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(2, docs.len());
        assert_eq!("AFP_ENG_20090101.0001", docs[0].id);
        assert_eq!("story", docs[0].doc_type);
        assert_eq!("Fireworks in Sydney", docs[0].headline);
        assert_eq!("SYDNEY, Jan 1", docs[0].dateline);
        assert_eq!(
            "Crowds gathered at the harbour. Police said R&D was fine.",
            docs[0].text
        );
        assert_eq!("Second document.", docs[1].text);
    }
}
