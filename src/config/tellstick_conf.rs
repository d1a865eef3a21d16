//! Reader for the telldus-core `tellstick.conf` file
//!
//! The file uses libconfuse syntax: `key = value` pairs and named
//! `section { ... }` blocks, which may nest (`parameters { ... }` inside
//! `device { ... }`). Values are either quoted strings (double or single
//! quotes) or bare tokens. `#` and `//` start a comment running to the end
//! of the line; `/* ... */` comments may span lines.
//!
//! ```text
//! user = "nobody"
//! device {
//!   id = 1
//!   name = "Lamp"
//!   protocol = "arctech"
//!   model = "selflearning-switch:nexa"
//!   parameters {
//!     house = "A"
//!     unit = "1"
//!   }
//! }
//! ```

use crate::error::{BridgeError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Parsed telldus-core configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TellstickConf {
    /// Top-level settings (user, group, deviceNode, ...)
    pub settings: BTreeMap<String, String>,

    /// Configured devices in file order
    pub devices: Vec<ConfDevice>,

    /// Configured controllers in file order
    pub controllers: Vec<BTreeMap<String, String>>,
}

/// One `device { ... }` block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfDevice {
    pub id: i64,

    /// Scalar fields other than `id`
    pub fields: BTreeMap<String, String>,

    /// Protocol parameters from the nested `parameters { ... }` block
    pub parameters: BTreeMap<String, String>,
}

impl TellstickConf {
    /// Read and parse the file at `path`
    ///
    /// A missing file is not an error: tdtool works without one and
    /// the merge step simply has nothing to contribute.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, continuing without static devices", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(BridgeError::config(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let tokens = tokenize(content)?;
        let mut parser = Parser { tokens, pos: 0 };
        let items = parser.items(false)?;

        let mut conf = TellstickConf::default();
        for (key, node) in items {
            match (key.as_str(), node) {
                (_, Node::Value(value)) => {
                    conf.settings.insert(key, value);
                }
                ("device", Node::Section(body)) => conf.devices.push(device_from(body)?),
                ("controller", Node::Section(body)) => conf.controllers.push(scalars(body)),
                (other, Node::Section(_)) => {
                    debug!("Ignoring unknown section \"{}\" in tellstick.conf", other);
                }
            }
        }

        Ok(conf)
    }

    /// Find the configured device with the given id
    pub fn device(&self, id: i64) -> Option<&ConfDevice> {
        self.devices.iter().find(|d| d.id == id)
    }
}

impl ConfDevice {
    /// Flatten into a single field map; parameters are namespaced as `parameters.<key>`
    pub fn flattened(&self) -> BTreeMap<String, String> {
        let mut out = self.fields.clone();
        for (key, value) in &self.parameters {
            out.insert(format!("parameters.{key}"), value.clone());
        }
        out
    }
}

fn device_from(body: Vec<(String, Node)>) -> Result<ConfDevice> {
    let mut id = None;
    let mut fields = BTreeMap::new();
    let mut parameters = BTreeMap::new();

    for (key, node) in body {
        match (key.as_str(), node) {
            ("id", Node::Value(value)) => {
                id = Some(value.trim().parse::<i64>().map_err(|_| {
                    BridgeError::config(format!("Invalid device id \"{value}\" in tellstick.conf"))
                })?);
            }
            ("parameters", Node::Section(params)) => parameters.extend(scalars(params)),
            (_, Node::Value(value)) => {
                fields.insert(key, value);
            }
            (_, Node::Section(_)) => {}
        }
    }

    let id = id.ok_or_else(|| BridgeError::config("Device block without id in tellstick.conf"))?;
    Ok(ConfDevice {
        id,
        fields,
        parameters,
    })
}

fn scalars(body: Vec<(String, Node)>) -> BTreeMap<String, String> {
    body.into_iter()
        .filter_map(|(key, node)| match node {
            Node::Value(value) => Some((key, value)),
            Node::Section(_) => None,
        })
        .collect()
}

#[derive(Debug)]
enum Node {
    Value(String),
    Section(Vec<(String, Node)>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Equals,
    Open,
    Close,
}

fn tokenize(content: &str) -> Result<Vec<(Token, usize)>> {
    let chars: Vec<char> = content.chars().collect();
    let mut tokens = Vec::new();
    let mut line_no = 1;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\n' => {
                line_no += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => i = skip_line(&chars, i),
            '/' if chars.get(i + 1) == Some(&'/') => i = skip_line(&chars, i),
            '/' if chars.get(i + 1) == Some(&'*') => {
                let opened_on = line_no;
                i += 2;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(BridgeError::parsing_error(format!(
                                "tellstick.conf line {opened_on}: unterminated comment"
                            )));
                        }
                        Some('*') if chars.get(i + 1) == Some(&'/') => {
                            i += 2;
                            break;
                        }
                        Some(c) => {
                            if *c == '\n' {
                                line_no += 1;
                            }
                            i += 1;
                        }
                    }
                }
            }
            '=' => {
                tokens.push((Token::Equals, line_no));
                i += 1;
            }
            '{' => {
                tokens.push((Token::Open, line_no));
                i += 1;
            }
            '}' => {
                tokens.push((Token::Close, line_no));
                i += 1;
            }
            quote @ ('"' | '\'') => {
                let opened_on = line_no;
                i += 1;
                let mut value = String::new();
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(BridgeError::parsing_error(format!(
                                "tellstick.conf line {opened_on}: unterminated string"
                            )));
                        }
                        Some('\\') if i + 1 < chars.len() => {
                            value.push(chars[i + 1]);
                            i += 2;
                        }
                        Some(c) if *c == quote => {
                            i += 1;
                            break;
                        }
                        Some(c) => {
                            if *c == '\n' {
                                line_no += 1;
                            }
                            value.push(*c);
                            i += 1;
                        }
                    }
                }
                tokens.push((Token::Quoted(value), opened_on));
            }
            _ => {
                let start = i;
                while i < chars.len() && !ends_word(&chars, i) {
                    i += 1;
                }
                tokens.push((Token::Word(chars[start..i].iter().collect()), line_no));
            }
        }
    }

    Ok(tokens)
}

fn skip_line(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

fn ends_word(chars: &[char], i: usize) -> bool {
    let c = chars[i];
    c.is_whitespace()
        || matches!(c, '=' | '{' | '}' | '"' | '\'' | '#')
        || (c == '/' && matches!(chars.get(i + 1), Some('/' | '*')))
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn items(&mut self, nested: bool) -> Result<Vec<(String, Node)>> {
        let mut items = Vec::new();

        loop {
            let (token, line) = match self.next() {
                Some(token) => token,
                None if nested => {
                    return Err(BridgeError::parsing_error("tellstick.conf: unclosed section"));
                }
                None => return Ok(items),
            };

            let key = match token {
                Token::Close if nested => return Ok(items),
                Token::Word(key) => key,
                other => {
                    return Err(BridgeError::parsing_error(format!(
                        "tellstick.conf line {line}: expected a key, found {other:?}"
                    )));
                }
            };

            match self.next() {
                Some((Token::Equals, line)) => match self.next() {
                    Some((Token::Word(value) | Token::Quoted(value), _)) => {
                        items.push((key, Node::Value(value)));
                    }
                    _ => {
                        return Err(BridgeError::parsing_error(format!(
                            "tellstick.conf line {line}: missing value for \"{key}\""
                        )));
                    }
                },
                Some((Token::Open, _)) => {
                    let body = self.items(true)?;
                    items.push((key, Node::Section(body)));
                }
                _ => {
                    return Err(BridgeError::parsing_error(format!(
                        "tellstick.conf line {line}: expected '=' or '{{' after \"{key}\""
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
user = "nobody"
group = "plugdev"
ignoreControllerConfirmation = "false"
device {
  id = 1
  name = "Livingroom:lamps-window"
  controller = 0
  protocol = "arctech"
  model = "selflearning-switch:nexa"
  parameters {
    # devices = "1"
    house = "A"
    unit = "1"
  }
}
device {
  id = 2
  name = "Hall dimmer" // trailing comment
  protocol = "arctech"
  model = "selflearning-dimmer:nexa"
}
controller {
  id = 1
  type = 2
  serial = "A501HHUN"
}
"#;

    #[test]
    fn test_parse_sample() {
        let conf = TellstickConf::parse(SAMPLE).unwrap();

        assert_eq!(conf.settings.get("user").map(String::as_str), Some("nobody"));
        assert_eq!(conf.devices.len(), 2);
        assert_eq!(conf.controllers.len(), 1);

        let lamp = conf.device(1).unwrap();
        assert_eq!(lamp.fields["name"], "Livingroom:lamps-window");
        assert_eq!(lamp.fields["controller"], "0");
        assert_eq!(lamp.parameters["house"], "A");
        assert!(!lamp.parameters.contains_key("devices"));

        let dimmer = conf.device(2).unwrap();
        assert_eq!(dimmer.fields["name"], "Hall dimmer");
        assert!(dimmer.parameters.is_empty());
        assert!(conf.device(3).is_none());
    }

    #[test]
    fn test_flattened_namespaces_parameters() {
        let conf = TellstickConf::parse(SAMPLE).unwrap();
        let flat = conf.device(1).unwrap().flattened();
        assert_eq!(flat["parameters.unit"], "1");
        assert_eq!(flat["protocol"], "arctech");
    }

    #[test]
    fn test_escaped_quotes() {
        let conf = TellstickConf::parse("device {\n id = 4\n name = \"The \\\"big\\\" lamp\"\n}").unwrap();
        assert_eq!(conf.devices[0].fields["name"], "The \"big\" lamp");
    }

    #[test]
    fn test_block_comments_span_lines() {
        let conf = TellstickConf::parse(
            "/* disabled\n device { id = 3 } */\ndevice {\n id = 1 /* inline */\n name = \"Lamp\"\n}\n",
        )
        .unwrap();
        assert_eq!(conf.devices.len(), 1);
        assert_eq!(conf.devices[0].id, 1);
        assert_eq!(conf.devices[0].fields["name"], "Lamp");
    }

    #[test]
    fn test_single_quoted_strings() {
        let conf = TellstickConf::parse(
            "device {\n id = 2\n name = 'Hall \"big\" lamp'\n model = 'selflearning-dimmer:nexa'\n}",
        )
        .unwrap();
        assert_eq!(conf.devices[0].fields["name"], "Hall \"big\" lamp");
        assert_eq!(conf.devices[0].fields["model"], "selflearning-dimmer:nexa");
    }

    #[test]
    fn test_syntax_errors_report_their_line() {
        let err = TellstickConf::parse("user = \"nobody\"\n/* never closed\n").unwrap_err();
        assert!(matches!(err, BridgeError::Parsing(ref msg) if msg.contains("line 2")));

        let err = TellstickConf::parse("device {\n id = 1\n name\n}").unwrap_err();
        assert!(matches!(err, BridgeError::Parsing(ref msg) if msg.contains("line 3")));
    }

    #[test]
    fn test_device_without_id_is_rejected() {
        let err = TellstickConf::parse("device {\n name = \"x\"\n}").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_unclosed_section_is_rejected() {
        assert!(TellstickConf::parse("device {\n id = 1\n").is_err());
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(TellstickConf::parse("").unwrap(), TellstickConf::default());
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_conf() {
        let dir = tempfile::tempdir().unwrap();
        let conf = TellstickConf::load(dir.path().join("absent.conf")).await.unwrap();
        assert!(conf.devices.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tellstick.conf");
        tokio::fs::write(&path, SAMPLE).await.unwrap();
        let conf = TellstickConf::load(&path).await.unwrap();
        assert_eq!(conf.devices.len(), 2);
    }
}
