use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmlEnumValue {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmlEnum {
    pub name: String,
    pub values: Vec<GmlEnumValue>,
}

impl GmlEnum {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = (&'static str, i64)>) -> Self {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|(name, value)| GmlEnumValue { name: name.into(), value })
                .collect(),
        }
    }

    pub fn member_for(&self, value: i64) -> Option<&GmlEnumValue> {
        self.values.iter().find(|v| v.value == value)
    }

    /// Members ordered by value, as they are declared.
    pub fn sorted_values(&self) -> Vec<&GmlEnumValue> {
        let mut sorted: Vec<&GmlEnumValue> = self.values.iter().collect();
        sorted.sort_by_key(|v| v.value);
        sorted
    }
}
