//! Field validators

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// Upload status codes, as reported by form-data decoders.
const UPLOAD_OK: i64 = 0;
const UPLOAD_INI_SIZE: i64 = 1;
const UPLOAD_FORM_SIZE: i64 = 2;
const UPLOAD_PARTIAL: i64 = 3;
const UPLOAD_NO_FILE: i64 = 4;
const UPLOAD_NO_TMP_DIR: i64 = 6;
const UPLOAD_CANT_WRITE: i64 = 7;
const UPLOAD_EXTENSION: i64 = 8;

const IMAGE_MIME_TYPES: [&str; 3] = ["image/png", "image/gif", "image/jpeg"];

/// Decides whether a field value conforms to a rule.
pub trait Validator: Send + Sync + fmt::Debug {
    /// Name the validator is registered under.
    fn name(&self) -> &'static str;

    fn is_valid(&self, value: &Value) -> bool;

    /// Message explaining why the value was rejected.
    fn fail_message(&self, value: &Value) -> String;
}

/// Look a validator up by the name used in schemas and configuration.
pub fn validator_by_name(name: &str) -> Option<Arc<dyn Validator>> {
    let validator: Arc<dyn Validator> = match name {
        "NonEmpty" => Arc::new(NonEmptyValidator),
        "Number" => Arc::new(NumberValidator),
        "Email" => Arc::new(EmailValidator),
        "PostedFile" => Arc::new(PostedFileValidator),
        "PostedImage" => Arc::new(PostedImageValidator),
        _ => return None,
    };
    Some(validator)
}

/// Run the validators of a field, collecting the messages of those that fail.
pub fn failed_validations(validators: Option<&Vec<Arc<dyn Validator>>>, name: &str, value: &Value) -> Vec<String> {
    validators
        .map(|validators| {
            validators
                .iter()
                .filter(|validator| {
                    tracing::debug!("Validating {} with {}...", name, validator.name());
                    !validator.is_valid(value)
                })
                .map(|validator| validator.fail_message(value))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyValidator;

impl Validator for NonEmptyValidator {
    fn name(&self) -> &'static str {
        "NonEmpty"
    }

    fn is_valid(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::String(text) => !text.is_empty(),
            Value::Array(items) => !items.is_empty(),
            // An upload form field without a file is empty too.
            Value::Object(object) => {
                !object.is_empty() && upload_status(value) != Some(UPLOAD_NO_FILE)
            }
            _ => true,
        }
    }

    fn fail_message(&self, _value: &Value) -> String {
        "This field cannot be empty.".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NumberValidator;

impl Validator for NumberValidator {
    fn name(&self) -> &'static str {
        "Number"
    }

    fn is_valid(&self, value: &Value) -> bool {
        match value {
            Value::Number(_) => true,
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .is_ok_and(|number| number.is_finite()),
            _ => false,
        }
    }

    fn fail_message(&self, _value: &Value) -> String {
        "The value must be a number.".to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmailValidator;

impl EmailValidator {
    fn pattern() -> &'static Regex {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        PATTERN.get_or_init(|| {
            Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
                .expect("static e-mail pattern compiles")
        })
    }
}

impl Validator for EmailValidator {
    fn name(&self) -> &'static str {
        "Email"
    }

    fn is_valid(&self, value: &Value) -> bool {
        value
            .as_str()
            .is_some_and(|address| !address.contains("..") && Self::pattern().is_match(address))
    }

    fn fail_message(&self, _value: &Value) -> String {
        "The e-mail address is not valid.".to_string()
    }
}

/// Accepts upload descriptors (`{"error", "type", "tmp_name"}`) whose file
/// arrived whole and is readable. A field without a file is valid; pair with
/// [`NonEmptyValidator`] to require one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostedFileValidator;

impl PostedFileValidator {
    fn failures(value: &Value) -> Vec<&'static str> {
        let Some(status) = upload_status(value) else {
            return vec!["the value is not a file upload"];
        };

        match status {
            UPLOAD_NO_FILE => Vec::new(),
            UPLOAD_OK => {
                let readable = value
                    .get("tmp_name")
                    .and_then(Value::as_str)
                    .is_some_and(|path| Path::new(path).is_file());
                if readable {
                    Vec::new()
                } else {
                    vec!["the uploaded file cannot be read"]
                }
            }
            UPLOAD_INI_SIZE | UPLOAD_FORM_SIZE => vec!["the file is too big"],
            UPLOAD_NO_TMP_DIR => vec!["there is no temporary space"],
            UPLOAD_CANT_WRITE => vec!["the file cannot be stored"],
            UPLOAD_EXTENSION => vec!["an extension has prevented the upload"],
            UPLOAD_PARTIAL => vec!["the file was only partially uploaded"],
            _ => vec!["the upload failed"],
        }
    }
}

impl Validator for PostedFileValidator {
    fn name(&self) -> &'static str {
        "PostedFile"
    }

    fn is_valid(&self, value: &Value) -> bool {
        Self::failures(value).is_empty()
    }

    fn fail_message(&self, value: &Value) -> String {
        sentence(&Self::failures(value))
    }
}

/// A [`PostedFileValidator`] that also requires an image MIME type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostedImageValidator;

impl PostedImageValidator {
    fn failures(value: &Value) -> Vec<&'static str> {
        let mut failures = PostedFileValidator::failures(value);
        if failures.is_empty() && upload_status(value) == Some(UPLOAD_OK) {
            let mime_type = value.get("type").and_then(Value::as_str).unwrap_or("");
            if !IMAGE_MIME_TYPES.contains(&mime_type) {
                failures.push("the uploaded file is not a recognised image");
            }
        }
        failures
    }
}

impl Validator for PostedImageValidator {
    fn name(&self) -> &'static str {
        "PostedImage"
    }

    fn is_valid(&self, value: &Value) -> bool {
        Self::failures(value).is_empty()
    }

    fn fail_message(&self, value: &Value) -> String {
        sentence(&Self::failures(value))
    }
}

fn upload_status(value: &Value) -> Option<i64> {
    value.as_object()?.get("error")?.as_i64()
}

fn sentence(parts: &[&str]) -> String {
    format!("{}.", crate::domain::utils::capitalize(&parts.join(", ")))
}
