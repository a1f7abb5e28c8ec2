//! Render-time data handed to templates.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::error::DomainError;
use super::sections::Sections;

/// Key under which extra, non-model values are exposed.
pub const VIEW_BAG_KEY: &str = "viewbag";
/// Key under which a layout receives the output rendered before it.
pub const BODY_KEY: &str = "body";

/// Ordered name → value mapping with case-insensitive names.
///
/// Built by copying a model; the source value is never touched again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataContext {
    entries: Vec<(String, Value)>,
}

impl DataContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert any serializable model. `null` yields an empty context; values
    /// that do not serialize to an object are rejected.
    pub fn from_serialize<T>(model: &T) -> Result<Self, DomainError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(model)
            .map_err(|err| DomainError::validation("model", err.to_string()))?;
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(DomainError::validation(
                "model",
                format!("expected an object, found {}", kind_of(&other)),
            )),
        }
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        let mut context = Self::new();
        for (name, value) in map {
            context.insert(name, value);
        }
        context
    }

    /// Expose `bag` under [`VIEW_BAG_KEY`].
    pub fn with_view_bag(mut self, bag: Map<String, Value>) -> Self {
        self.insert(VIEW_BAG_KEY, Value::Object(bag));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|index| &self.entries[index].1)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Insert or replace; a name differing only in case replaces the old entry.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => self.entries[index] = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.position(name)
            .map(|index| self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        )
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing == name)
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
            })
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Everything a render function sees: the data plus the section store shared
/// by one view and its layouts.
#[derive(Debug, Clone)]
pub struct RenderContext {
    data: DataContext,
    sections: Arc<Sections>,
}

impl RenderContext {
    pub fn new(data: DataContext) -> Self {
        Self {
            data,
            sections: Arc::new(Sections::new()),
        }
    }

    pub fn data(&self) -> &DataContext {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataContext {
        &mut self.data
    }

    pub fn sections(&self) -> &Arc<Sections> {
        &self.sections
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    struct Model {
        #[serde(rename = "User")]
        user: &'static str,
        count: u32,
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let context = DataContext::from_serialize(&Model {
            user: "World",
            count: 2,
        })
        .unwrap();

        assert_eq!(context.get("user"), Some(&json!("World")));
        assert_eq!(context.get("USER"), Some(&json!("World")));
        assert_eq!(context.get("Count"), Some(&json!(2)));
        assert_eq!(context.get("missing"), None);
    }

    #[test]
    fn exact_match_wins_over_case_folded_match() {
        let mut context = DataContext::new();
        context.insert("Name", "upper");
        context.entries.push(("name".to_string(), json!("lower")));

        assert_eq!(context.get("name"), Some(&json!("lower")));
        assert_eq!(context.get("Name"), Some(&json!("upper")));
    }

    #[test]
    fn insert_replaces_case_insensitively() {
        let mut context = DataContext::from_serialize(&json!({"Body": "old"})).unwrap();
        context.insert(BODY_KEY, "new");

        assert_eq!(context.len(), 1);
        assert_eq!(context.get("body"), Some(&json!("new")));
    }

    #[test]
    fn conversion_copies_the_model() {
        let model = json!({"items": [1, 2, 3]});
        let mut context = DataContext::from_serialize(&model).unwrap();
        context.insert("items", json!([]));

        assert_eq!(model["items"], json!([1, 2, 3]));
    }

    #[test]
    fn null_model_is_empty_and_scalars_are_rejected() {
        assert!(DataContext::from_serialize(&()).unwrap().is_empty());
        assert!(DataContext::from_serialize(&42).is_err());
    }

    #[test]
    fn view_bag_is_exposed() {
        let mut bag = Map::new();
        bag.insert("title".to_string(), json!("Home"));
        let context = DataContext::new().with_view_bag(bag);

        assert_eq!(context.get("ViewBag"), Some(&json!({"title": "Home"})));
    }
}
