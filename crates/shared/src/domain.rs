use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(SubscriptionId);

/// Catalog template identifier, e.g. `bilibili_user_videos`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFieldSchema {
    pub name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(
        default,
        rename = "validation_regex",
        skip_serializing_if = "Option::is_none"
    )]
    pub validation_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
}

impl FormFieldSchema {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: None,
            field_type,
            required: false,
            placeholder: None,
            validation_pattern: None,
            validation_message: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.validation_pattern = Some(pattern.into());
        self.validation_message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: TemplateId,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub platform: String,
    #[serde(default, rename = "parameters")]
    pub form_schema: Vec<FormFieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub template_id: TemplateId,
    pub display_name: String,
    pub target_identifier: String,
    pub platform: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchFrequency {
    #[default]
    Daily,
    ThreeDays,
    Weekly,
}

impl FetchFrequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::ThreeDays => "three_days",
            Self::Weekly => "weekly",
        }
    }

    pub fn interval_days(self) -> u32 {
        match self {
            Self::Daily => 1,
            Self::ThreeDays => 3,
            Self::Weekly => 7,
        }
    }
}

impl fmt::Display for FetchFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FetchFrequency {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "daily" => Ok(Self::Daily),
            "three_days" => Ok(Self::ThreeDays),
            "weekly" => Ok(Self::Weekly),
            other => Err(format!(
                "unknown frequency '{other}', expected daily, three_days or weekly"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    pub auto_fetch_enabled: bool,
    pub frequency: FetchFrequency,
    pub preferred_hour: u8,
    pub daily_limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Partial update of a [`FetchConfig`]; absent fields are left untouched server-side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fetch_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<FetchFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u32>,
}

impl FetchConfigPatch {
    pub fn is_empty(&self) -> bool {
        self.auto_fetch_enabled.is_none()
            && self.frequency.is_none()
            && self.preferred_hour.is_none()
            && self.daily_limit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchQuota {
    pub daily_limit: u32,
    pub current_count: u32,
    pub remaining_count: u32,
    pub can_fetch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetch_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualFetchReport {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_after: Option<FetchQuota>,
}
