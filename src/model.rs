use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const SECTIONS: [(&str, &str); 5] = [
    ("request_definition", "r"),
    ("policy_definition", "p"),
    ("role_definition", "g"),
    ("policy_effect", "e"),
    ("matchers", "m"),
];

const REQUIRED_SECTIONS: [&str; 4] = ["r", "p", "e", "m"];

/// Policy model definition (request, policy, role, effect and matcher sections).
///
/// The model only holds the parsed definition; evaluating it is left to the
/// engine. An empty model is valid and describes an engine that has not been
/// configured yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyModel {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl PolicyModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses a model definition file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let mut model = Self::new();
        model.load_model(path)?;
        Ok(model)
    }

    /// Parses a model definition held in memory.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut model = Self::new();
        model.load_model_from_text(text)?;
        Ok(model)
    }

    /// Replaces this model with the definition read from `path`.
    ///
    /// On failure the model is left unchanged.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::ModelLoad {
            path: path.to_path_buf(),
            source,
        })?;
        self.sections = parse(&text, &path.display().to_string())?;
        Ok(())
    }

    /// Replaces this model with the definition in `text`.
    ///
    /// On failure the model is left unchanged.
    pub fn load_model_from_text(&mut self, text: &str) -> Result<()> {
        self.sections = parse(text, "<text>")?;
        Ok(())
    }

    /// Returns true when no definition has been loaded.
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Returns true when the section (`r`, `p`, `g`, `e` or `m`) is defined.
    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    /// Returns the value assigned to `key` within `section`.
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    /// Iterates over defined section keys in sorted order.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}

fn section_key(header: &str) -> Option<&'static str> {
    SECTIONS
        .iter()
        .find(|(name, _)| *name == header)
        .map(|(_, key)| *key)
}

fn parse_error(origin: &str, line: usize, message: impl Into<String>) -> Error {
    Error::ModelParse {
        origin: origin.to_string(),
        line,
        message: message.into(),
    }
}

fn parse(text: &str, origin: &str) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current: Option<&'static str> = None;
    let mut pending = String::new();
    let mut pending_start = 0;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if pending.is_empty() {
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[') {
                let header = header
                    .strip_suffix(']')
                    .ok_or_else(|| parse_error(origin, line_no, "unterminated section header"))?
                    .trim();
                let key = section_key(header).ok_or_else(|| {
                    parse_error(origin, line_no, format!("unknown section [{header}]"))
                })?;
                sections.entry(key.to_string()).or_default();
                current = Some(key);
                continue;
            }
            pending_start = line_no;
        }

        if let Some(head) = line.strip_suffix('\\') {
            pending.push_str(head.trim_end());
            pending.push(' ');
            continue;
        }
        pending.push_str(line);

        let statement = std::mem::take(&mut pending);
        let section =
            current.ok_or_else(|| parse_error(origin, pending_start, "assignment outside a section"))?;
        let (key, value) = statement
            .split_once('=')
            .ok_or_else(|| parse_error(origin, pending_start, "expected `key = value`"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(parse_error(origin, pending_start, "empty key"));
        }
        if !key.starts_with(section) {
            return Err(parse_error(
                origin,
                pending_start,
                format!("key `{key}` does not belong to section `{section}`"),
            ));
        }
        sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.trim().to_string());
    }

    if !pending.is_empty() {
        return Err(parse_error(origin, pending_start, "dangling line continuation"));
    }

    if sections.is_empty() {
        return Ok(sections);
    }
    for required in REQUIRED_SECTIONS {
        if sections.get(required).is_none_or(BTreeMap::is_empty) {
            return Err(parse_error(
                origin,
                0,
                format!("missing required section `{required}`"),
            ));
        }
    }
    Ok(sections)
}
