use mongodb::bson::spec::ElementType;
use mongodb::bson::{Bson, Document};

/// Renders one value at the given indent level.
pub type Formatter = fn(&Pretty, &Bson, usize) -> String;

/// Pretty printer for BSON values with per-type formatters.
///
/// Documents print their keys sorted, one entry per line.
#[derive(Clone)]
pub struct Pretty {
    htchar: String,
    lfchar: String,
    indent: usize,
    formatters: Vec<(ElementType, Formatter)>,
}

impl Default for Pretty {
    fn default() -> Self {
        Pretty {
            htchar: "  ".to_string(),
            lfchar: "\n".to_string(),
            indent: 0,
            formatters: vec![
                (ElementType::EmbeddedDocument, Pretty::document_formatter),
                (ElementType::Array, Pretty::array_formatter),
            ],
        }
    }
}

impl Pretty {
    pub fn new() -> Pretty {
        Pretty::default()
    }

    pub fn htchar(mut self, htchar: &str) -> Pretty {
        self.htchar = htchar.to_string();
        self
    }

    pub fn lfchar(mut self, lfchar: &str) -> Pretty {
        self.lfchar = lfchar.to_string();
        self
    }

    pub fn indent(mut self, indent: usize) -> Pretty {
        self.indent = indent;
        self
    }

    /// Overrides the formatter for one BSON type.
    pub fn add_formatter(&mut self, element_type: ElementType, formatter: Formatter) {
        match self.formatters.iter_mut().find(|(t, _)| *t == element_type) {
            Some(entry) => entry.1 = formatter,
            None => self.formatters.push((element_type, formatter)),
        }
    }

    pub fn get_formatter(&self, value: &Bson) -> Formatter {
        let element_type = value.element_type();
        self.formatters
            .iter()
            .find(|(t, _)| *t == element_type)
            .map(|(_, f)| *f)
            .unwrap_or(Pretty::value_formatter)
    }

    pub fn format(&self, value: &Bson) -> String {
        self.format_at(value, self.indent)
    }

    pub fn format_document(&self, doc: &Document) -> String {
        self.format(&Bson::Document(doc.clone()))
    }

    fn format_at(&self, value: &Bson, indent: usize) -> String {
        (self.get_formatter(value))(self, value, indent)
    }

    fn line(&self, indent: usize) -> String {
        format!("{}{}", self.lfchar, self.htchar.repeat(indent))
    }

    pub fn value_formatter(&self, value: &Bson, _indent: usize) -> String {
        value.to_string()
    }

    pub fn document_formatter(&self, value: &Bson, indent: usize) -> String {
        let Bson::Document(doc) = value else {
            return self.value_formatter(value, indent);
        };
        let mut keys: Vec<&String> = doc.keys().collect();
        keys.sort();
        let items: Vec<String> = keys
            .into_iter()
            .filter_map(|key| doc.get(key).map(|v| (key, v)))
            .map(|(key, v)| {
                format!(
                    "{}{:?}: {}",
                    self.line(indent + 1),
                    key,
                    self.format_at(v, indent + 1)
                )
            })
            .collect();
        format!("{{{}{}}}", items.join(","), self.line(indent))
    }

    pub fn array_formatter(&self, value: &Bson, indent: usize) -> String {
        let Bson::Array(items) = value else {
            return self.value_formatter(value, indent);
        };
        let items: Vec<String> = items
            .iter()
            .map(|item| format!("{}{}", self.line(indent + 1), self.format_at(item, indent + 1)))
            .collect();
        format!("[{}{}]", items.join(","), self.line(indent))
    }
}

/// Embeds a value in a reStructuredText code block.
pub fn sphinx_pretty(value: &Bson, name: &str) -> String {
    let pretty = Pretty::new().indent(2);
    format!(
        ".. code-block:: Javascript\n\n    {} = {}\n\n",
        name,
        pretty.format(value)
    )
}
