use std::{fmt, path::Path};

use anyhow::Context;
use serde::{de, Deserialize, Deserializer};

const DEFAULT_HEADING_FONT: &str = "Century Gothic";
const DEFAULT_HEADING_SIZE: u32 = 20;

/// Student-wide configuration, loaded once from `config.yml`.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentInfo {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Program")]
    pub program: String,

    #[serde(rename = "ASU_ID", deserialize_with = "string_or_number")]
    pub asu_id: String,

    #[serde(rename = "UEL_ID")]
    pub uel_id: i64,

    #[serde(rename = "Semester", deserialize_with = "string_or_number")]
    pub semester: String,

    #[serde(rename = "Academic_Year", deserialize_with = "string_or_number")]
    pub academic_year: String,

    #[serde(rename = "Submission_Date", deserialize_with = "string_or_number")]
    pub submission_date: String,

    /// Output filename format, e.g. `{Name}_{ASU_Code}`
    #[serde(rename = "Format")]
    pub format: String,

    #[serde(rename = "Courses", default)]
    pub courses: Vec<Course>,

    #[serde(rename = "Heading_Font", default = "default_heading_font")]
    pub heading_font: String,

    /// Heading font size in points
    #[serde(rename = "Heading_Size", default = "default_heading_size")]
    pub heading_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Course {
    /// Folder name under the courses directory
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "ASU_Name")]
    pub asu_name: String,

    #[serde(rename = "ASU_Code")]
    pub asu_code: i64,

    #[serde(rename = "UEL_Name")]
    pub uel_name: String,

    #[serde(rename = "UEL_Code")]
    pub uel_code: i64,
}

fn default_heading_font() -> String {
    DEFAULT_HEADING_FONT.to_owned()
}

fn default_heading_size() -> u32 {
    DEFAULT_HEADING_SIZE
}

/// Accepts YAML scalars such as `ASU_ID: 1900123` for fields kept as text.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct ScalarVisitor;

    impl<'a> de::Visitor<'a> for ScalarVisitor {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or a number")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(ScalarVisitor)
}

impl StudentInfo {
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("malformed student configuration")
    }

    /// Load the configuration from a YAML file
    #[tracing::instrument]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("can't read config file {}", path.display()))?;
        let info = Self::from_yaml(&content)
            .with_context(|| format!("can't parse config file {}", path.display()))?;
        tracing::debug!(
            "Loaded configuration for {} with {} course(s)",
            info.name,
            info.courses.len()
        );
        Ok(info)
    }

    /// First course whose `Name` equals the folder name, case-sensitive.
    pub fn find_course(&self, folder_name: &str) -> Option<&Course> {
        self.courses.iter().find(|c| c.name == folder_name)
    }
}
