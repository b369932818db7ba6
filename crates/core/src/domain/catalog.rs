use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestCategory {
    Vacation,
    PaidLeave,
    UnpaidLeave,
    ShiftChange,
    TimeForTime,
    SickLeave,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityUnit {
    Days,
    Hours,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTypeDefinition {
    pub code: String,
    pub name: String,
    pub category: RequestCategory,
    pub unit: QuantityUnit,
    /// When set, white-collar requests of this type still pass through HR.
    #[serde(default)]
    pub hr_mandatory: bool,
    /// Custom-field keys that must be present in the request payload.
    #[serde(default)]
    pub required_fields: Vec<String>,
}

impl RequestTypeDefinition {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: RequestCategory,
        unit: QuantityUnit,
    ) -> Self {
        Self {
            code: normalize_code(&code.into()),
            name: name.into(),
            category,
            unit,
            hr_mandatory: false,
            required_fields: Vec::new(),
        }
    }

    pub fn with_hr_mandatory(mut self, hr_mandatory: bool) -> Self {
        self.hr_mandatory = hr_mandatory;
        self
    }

    pub fn with_required_field(mut self, key: impl Into<String>) -> Self {
        self.required_fields.push(key.into());
        self
    }

    pub fn is_shift_change(&self) -> bool {
        self.category == RequestCategory::ShiftChange
    }
}

/// Lookup table of configured request types keyed by normalized code.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestTypeCatalog {
    types: BTreeMap<String, RequestTypeDefinition>,
}

impl RequestTypeCatalog {
    pub fn new(types: Vec<RequestTypeDefinition>) -> Self {
        let types = types
            .into_iter()
            .map(|definition| (normalize_code(&definition.code), definition))
            .collect();
        Self { types }
    }

    /// Standard Mexican absence types. None is marked HR-mandatory until product
    /// confirms which ones are.
    pub fn standard() -> Self {
        use QuantityUnit::{Days, Hours};
        use RequestCategory::*;

        Self::new(vec![
            RequestTypeDefinition::new("vacation", "Vacaciones", Vacation, Days),
            RequestTypeDefinition::new("paid_leave", "Permiso con goce", PaidLeave, Days),
            RequestTypeDefinition::new("unpaid_leave", "Permiso sin goce", UnpaidLeave, Days),
            RequestTypeDefinition::new("shift_change", "Cambio de turno", ShiftChange, Days),
            RequestTypeDefinition::new("time_for_time", "Tiempo por tiempo", TimeForTime, Hours),
            RequestTypeDefinition::new("sick_leave", "Incapacidad", SickLeave, Days),
        ])
    }

    pub fn get(&self, code: &str) -> Option<&RequestTypeDefinition> {
        self.types.get(&normalize_code(code))
    }

    pub fn definitions(&self) -> impl Iterator<Item = &RequestTypeDefinition> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{QuantityUnit, RequestCategory, RequestTypeCatalog, RequestTypeDefinition};

    #[test]
    fn standard_catalog_has_no_hr_mandatory_types() {
        let catalog = RequestTypeCatalog::standard();

        assert_eq!(catalog.len(), 6);
        assert!(catalog.definitions().all(|definition| !definition.hr_mandatory));
        assert_eq!(catalog.get("time_for_time").map(|t| t.unit), Some(QuantityUnit::Hours));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let catalog = RequestTypeCatalog::new(vec![RequestTypeDefinition::new(
            "Maternity",
            "Maternidad",
            RequestCategory::PaidLeave,
            QuantityUnit::Days,
        )
        .with_hr_mandatory(true)]);

        let definition = catalog.get(" MATERNITY ").expect("type should resolve");
        assert!(definition.hr_mandatory);
        assert!(catalog.get("paternity").is_none());
    }
}
