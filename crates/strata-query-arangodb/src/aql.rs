use strata_query::{BindValue, Statement, StatementKind};

/// Accumulates AQL text and its bind variables.
///
/// Every value and attribute name goes through a bind variable; only
/// keywords chosen by the compiler are written into the text.
#[derive(Debug, Default)]
pub struct AqlBuilder {
    binds: Vec<(String, BindValue)>,
    values: usize,
    attributes: usize,
}

impl AqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a value, returning its placeholder (`@value0`)
    pub fn value(&mut self, value: BindValue) -> String {
        let name = format!("value{}", self.values);
        self.values += 1;
        self.binds.push((name.clone(), value));
        format!("@{}", name)
    }

    /// Bind an attribute name, returning its placeholder (`@attr0`)
    pub fn attribute(&mut self, name: &str) -> String {
        let bind = format!("attr{}", self.attributes);
        self.attributes += 1;
        self.binds.push((bind.clone(), BindValue::Text(name.to_string())));
        format!("@{}", bind)
    }

    /// `alias.@attrN` access path
    pub fn access(&mut self, alias: &str, name: &str) -> String {
        let attr = self.attribute(name);
        format!("{}.{}", alias, attr)
    }

    /// Bind the collection, returning `@@collection`
    pub fn collection(&mut self, name: &str) -> String {
        self.binds
            .push(("@collection".to_string(), BindValue::Text(name.to_string())));
        "@@collection".to_string()
    }

    pub fn finish(self, kind: StatementKind, text: impl Into<String>) -> Statement {
        let mut statement = Statement::new(kind, text);
        for (name, value) in self.binds {
            statement.push_bind(name, value);
        }
        statement
    }
}
