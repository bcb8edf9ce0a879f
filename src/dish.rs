use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row};
use thiserror::Error;

use crate::AppError;

/// A persisted menu row. `id` is assigned by the store on insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dish {
    pub id: i64,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub category: String,
}

/// A dish as delivered by the remote menu, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDish {
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    pub category: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("price must not be negative (got {price})")]
    NegativePrice { price: f64 },
    #[error("price must be a finite number")]
    NonFinitePrice,
    #[error("{field} is not valid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "VALIDATION/MISSING_FIELD",
            ValidationError::NegativePrice { .. } => "VALIDATION/NEGATIVE_PRICE",
            ValidationError::NonFinitePrice => "VALIDATION/NON_FINITE_PRICE",
            ValidationError::InvalidField { .. } => "VALIDATION/INVALID_FIELD",
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingField { field } => field,
            ValidationError::NegativePrice { .. } | ValidationError::NonFinitePrice => "price",
            ValidationError::InvalidField { field, .. } => field,
        }
    }
}

impl Dish {
    pub fn formatted_price(&self) -> String {
        format_price(self.price)
    }

    /// Resolves the relative image identifier against `base`.
    pub fn image_url(&self, base: &str) -> Option<String> {
        image_url(base, &self.image)
    }
}

impl TryFrom<&SqliteRow> for Dish {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            name: row
                .try_get::<Option<String>, _>("name")
                .map_err(AppError::from)?
                .unwrap_or_default(),
            price: row
                .try_get::<Option<f64>, _>("price")
                .map_err(AppError::from)?
                .unwrap_or_default(),
            description: row
                .try_get::<Option<String>, _>("description")
                .map_err(AppError::from)?
                .unwrap_or_default(),
            image: row
                .try_get::<Option<String>, _>("image")
                .map_err(AppError::from)?
                .unwrap_or_default(),
            category: row
                .try_get::<Option<String>, _>("category")
                .map_err(AppError::from)?
                .unwrap_or_default(),
        })
    }
}

impl NewDish {
    /// Decodes one remote menu element. Missing `description`/`image`
    /// default to empty; `price` may arrive as a number or numeric string.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let map = value
            .as_object()
            .ok_or(ValidationError::InvalidField {
                field: "menu",
                reason: "expected an object",
            })?;

        let required_text = |key: &'static str| -> Result<String, ValidationError> {
            map.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or(ValidationError::MissingField { field: key })
        };
        let optional_text = |key: &str| -> String {
            map.get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default()
        };

        let price = match map.get("price") {
            Some(Value::Number(num)) => num.as_f64().ok_or(ValidationError::NonFinitePrice)?,
            Some(Value::String(raw)) => {
                raw.trim()
                    .parse::<f64>()
                    .map_err(|_| ValidationError::InvalidField {
                        field: "price",
                        reason: "not a number",
                    })?
            }
            _ => return Err(ValidationError::MissingField { field: "price" }),
        };

        let dish = NewDish {
            name: required_text("name")?,
            price,
            description: optional_text("description"),
            image: optional_text("image"),
            category: required_text("category")?,
        };
        dish.validate()?;
        Ok(dish)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "name" });
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "category" });
        }
        if !self.price.is_finite() {
            return Err(ValidationError::NonFinitePrice);
        }
        if self.price < 0.0 {
            return Err(ValidationError::NegativePrice { price: self.price });
        }
        Ok(())
    }
}

pub fn format_price(price: f64) -> String {
    format!("${price:.2}")
}

pub fn image_url(base: &str, image: &str) -> Option<String> {
    let image = image.trim();
    if image.is_empty() {
        return None;
    }
    if image.starts_with("http://") || image.starts_with("https://") {
        return Some(image.to_string());
    }
    let base = base.trim_end_matches('/');
    Some(format!("{base}/{image}?raw=true"))
}
