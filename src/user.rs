//! User context for evaluation, modeled after
//! `original_source/src/lduser.c`'s field set and attribute lookup order.

use crate::config::Config;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifiers and attributes for a single evaluation subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(rename = "firstName", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<BTreeMap<String, Value>>,
    #[serde(
        rename = "privateAttributeNames",
        default,
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub private_attribute_names: BTreeSet<String>,
}

impl User {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secondary: None,
            anonymous: false,
            ip: None,
            first_name: None,
            last_name: None,
            email: None,
            name: None,
            avatar: None,
            custom: None,
            private_attribute_names: BTreeSet::new(),
        }
    }

    pub fn builder(key: impl Into<String>) -> UserBuilder {
        UserBuilder(Self::new(key))
    }

    /// Looks up an attribute by name, built-ins first, then `custom`.
    ///
    /// Returns `None` when the attribute is absent — distinct from an
    /// explicit `Value::Null`, per the data model invariant in spec.md §3.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "key" => Some(Value::Text(self.key.clone())),
            "secondary" => self.secondary.clone().map(Value::Text),
            "ip" => self.ip.clone().map(Value::Text),
            "email" => self.email.clone().map(Value::Text),
            "firstName" => self.first_name.clone().map(Value::Text),
            "lastName" => self.last_name.clone().map(Value::Text),
            "avatar" => self.avatar.clone().map(Value::Text),
            "name" => self.name.clone().map(Value::Text),
            "anonymous" => Some(Value::Bool(self.anonymous)),
            _ => self.custom.as_ref().and_then(|c| c.get(name)).cloned(),
        }
    }

    fn is_private(&self, config: &Config, attr: &str) -> bool {
        config.all_attributes_private
            || config
                .private_attribute_names
                .iter()
                .any(|a| a == attr)
            || self.private_attribute_names.contains(attr)
    }

    /// Builds a redacted projection of this user for event emission.
    ///
    /// Returns the projected JSON-like tree plus the list of attribute
    /// names that were redacted out of it, functionally (no in-place
    /// mutation of a duplicated tree — see `SPEC_FULL.md`'s Open Question
    /// decisions).
    pub fn to_redacted_json(&self, config: &Config) -> (Value, Vec<String>) {
        let mut obj = BTreeMap::new();
        let mut hidden = Vec::new();

        obj.insert("key".to_string(), Value::Text(self.key.clone()));
        if self.anonymous {
            obj.insert("anonymous".to_string(), Value::Bool(true));
        }

        macro_rules! project_string {
            ($field:ident, $name:literal) => {
                if let Some(v) = &self.$field {
                    if self.is_private(config, $name) {
                        hidden.push($name.to_string());
                    } else {
                        obj.insert($name.to_string(), Value::Text(v.clone()));
                    }
                }
            };
        }
        project_string!(secondary, "secondary");
        project_string!(ip, "ip");
        project_string!(first_name, "firstName");
        project_string!(last_name, "lastName");
        project_string!(email, "email");
        project_string!(name, "name");
        project_string!(avatar, "avatar");

        if let Some(custom) = &self.custom {
            let mut projected = BTreeMap::new();
            for (k, v) in custom {
                if self.is_private(config, k) {
                    hidden.push(k.clone());
                } else {
                    projected.insert(k.clone(), v.clone());
                }
            }
            obj.insert("custom".to_string(), Value::Object(projected));
        }

        if !hidden.is_empty() {
            obj.insert(
                "privateAttrs".to_string(),
                Value::Array(hidden.iter().cloned().map(Value::Text).collect()),
            );
        }

        (Value::Object(obj), hidden)
    }
}

#[allow(dead_code)]
pub struct UserBuilder(User);

impl UserBuilder {
    pub fn secondary(mut self, v: impl Into<String>) -> Self {
        self.0.secondary = Some(v.into());
        self
    }

    pub fn anonymous(mut self, v: bool) -> Self {
        self.0.anonymous = v;
        self
    }

    pub fn ip(mut self, v: impl Into<String>) -> Self {
        self.0.ip = Some(v.into());
        self
    }

    pub fn first_name(mut self, v: impl Into<String>) -> Self {
        self.0.first_name = Some(v.into());
        self
    }

    pub fn last_name(mut self, v: impl Into<String>) -> Self {
        self.0.last_name = Some(v.into());
        self
    }

    pub fn email(mut self, v: impl Into<String>) -> Self {
        self.0.email = Some(v.into());
        self
    }

    pub fn name(mut self, v: impl Into<String>) -> Self {
        self.0.name = Some(v.into());
        self
    }

    pub fn avatar(mut self, v: impl Into<String>) -> Self {
        self.0.avatar = Some(v.into());
        self
    }

    pub fn custom(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0
            .custom
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn private_attribute(mut self, name: impl Into<String>) -> Self {
        self.0.private_attribute_names.insert(name.into());
        self
    }

    pub fn build(self) -> User {
        self.0
    }
}
