use std::borrow::Cow;
use std::fmt;

use chrono::{DateTime, Utc};

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// A value in its transport-encoded form.
///
/// The correlation layer never inspects a [`WireValue`]: only a [`DataType`]
/// knows how to produce one from a [`Value`] and how to read it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireValue(JsonValue);

impl WireValue {
    /// Creates a [`WireValue`] from raw `JSON`.
    #[must_use]
    pub const fn new(value: JsonValue) -> Self {
        Self(value)
    }

    /// Returns the underlying `JSON`.
    #[must_use]
    pub const fn as_json(&self) -> &JsonValue {
        &self.0
    }

    /// Consumes the [`WireValue`] and returns the underlying `JSON`.
    #[must_use]
    pub fn into_json(self) -> JsonValue {
        self.0
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Longitude in degrees, in the `[-180, 180]` range.
    pub longitude: f64,
    /// Latitude in degrees, in the `[-90, 90]` range.
    pub latitude: f64,
}

impl Location {
    /// Creates a [`Location`].
    #[must_use]
    pub const fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    fn is_valid(&self) -> bool {
        (-180.0..=180.0).contains(&self.longitude) && (-90.0..=90.0).contains(&self.latitude)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.longitude, self.latitude)
    }
}

/// A raw attribute or action value, before encoding and after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An integer.
    Integer(i64),
    /// A double precision floating point number.
    Double(f64),
    /// A string.
    String(String),
    /// A point in time.
    Date(DateTime<Utc>),
    /// One of the values of an enumeration.
    Enum(String),
    /// A geographic position.
    Location(Location),
    /// A boolean.
    Boolean(bool),
}

impl Value {
    /// Returns the name of the [`Value`] variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Date(_) => "date",
            Self::Enum(_) => "enum",
            Self::Location(_) => "location",
            Self::Boolean(_) => "boolean",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => v.fmt(f),
            Self::Double(v) => v.fmt(f),
            Self::String(v) | Self::Enum(v) => v.fmt(f),
            Self::Date(v) => v.to_rfc3339().fmt(f),
            Self::Location(v) => v.fmt(f),
            Self::Boolean(v) => v.fmt(f),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.into())
    }
}

macro_rules! value_conversion {
    ($ty:ty, $variant:ident, $name:literal $(, $alias:ident)?) => {
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }

        impl TryFrom<Value> for $ty {
            type Error = CodecError;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$variant(v) $(| Value::$alias(v))? => Ok(v),
                    other => Err(CodecError::new(
                        $name,
                        format!("expected {} value, found {}", $name, other.kind()),
                    )),
                }
            }
        }
    };
}

value_conversion!(i64, Integer, "integer");
value_conversion!(f64, Double, "double");
value_conversion!(String, String, "string", Enum);
value_conversion!(DateTime<Utc>, Date, "date");
value_conversion!(Location, Location, "location");
value_conversion!(bool, Boolean, "boolean");

/// A failure to encode or decode a value against its [`DataType`].
#[derive(Debug, Clone, PartialEq)]
pub struct CodecError {
    data_type: &'static str,
    description: Cow<'static, str>,
}

impl CodecError {
    pub(crate) fn new(data_type: &'static str, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            data_type,
            description: description.into(),
        }
    }

    /// Returns the name of the [`DataType`] which raised the error.
    #[must_use]
    pub const fn data_type(&self) -> &'static str {
        self.data_type
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} codec: {}", self.data_type, self.description)
    }
}

impl std::error::Error for CodecError {}

/// The type of an attribute value, or of an action request or response.
///
/// Each variant knows how to encode a [`Value`] into a [`WireValue`] and how
/// to decode it back, rejecting values which violate its constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DataType {
    /// An integer, optionally bounded.
    Integer {
        /// Minimum accepted value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        /// Maximum accepted value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    /// A finite double, optionally bounded.
    Double {
        /// Minimum accepted value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        /// Maximum accepted value.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    /// A string, optionally limited in length.
    String {
        /// Maximum number of characters.
        #[serde(
            default,
            rename = "maxLength",
            skip_serializing_if = "Option::is_none"
        )]
        max_length: Option<usize>,
    },
    /// A point in time, transmitted as milliseconds since the Unix epoch.
    Date,
    /// One value out of a closed set.
    Enum {
        /// Accepted values.
        values: Vec<String>,
    },
    /// A geographic position.
    Location,
    /// A boolean.
    Boolean,
}

impl DataType {
    /// Creates an unbounded [`DataType::Integer`].
    #[must_use]
    pub const fn integer() -> Self {
        Self::Integer {
            min: None,
            max: None,
        }
    }

    /// Creates a [`DataType::Integer`] accepting values in `[min, max]`.
    #[must_use]
    pub const fn integer_range(min: i64, max: i64) -> Self {
        Self::Integer {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Creates an unbounded [`DataType::Double`].
    #[must_use]
    pub const fn double() -> Self {
        Self::Double {
            min: None,
            max: None,
        }
    }

    /// Creates a [`DataType::Double`] accepting values in `[min, max]`.
    #[must_use]
    pub const fn double_range(min: f64, max: f64) -> Self {
        Self::Double {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Creates a [`DataType::String`] without length limits.
    #[must_use]
    pub const fn string() -> Self {
        Self::String { max_length: None }
    }

    /// Creates a [`DataType::String`] accepting at most `max_length`
    /// characters.
    #[must_use]
    pub const fn string_with_max_length(max_length: usize) -> Self {
        Self::String {
            max_length: Some(max_length),
        }
    }

    /// Creates a [`DataType::Enum`] from its accepted values.
    #[must_use]
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the [`DataType`] name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Integer { .. } => "integer",
            Self::Double { .. } => "double",
            Self::String { .. } => "string",
            Self::Date => "date",
            Self::Enum { .. } => "enum",
            Self::Location => "location",
            Self::Boolean => "boolean",
        }
    }

    /// Encodes a [`Value`] into its [`WireValue`].
    ///
    /// # Errors
    ///
    /// The value is of a different kind or violates a constraint of this
    /// [`DataType`].
    pub fn encode(&self, value: &Value) -> Result<WireValue, CodecError> {
        self.validate(value)?;

        let json = match value {
            Value::Integer(v) => JsonValue::from(*v),
            Value::Double(v) => JsonValue::from(*v),
            Value::String(v) | Value::Enum(v) => JsonValue::from(v.as_str()),
            Value::Date(v) => JsonValue::from(v.timestamp_millis()),
            Value::Location(v) => json!({
                "longitude": v.longitude,
                "latitude": v.latitude,
            }),
            Value::Boolean(v) => JsonValue::from(*v),
        };

        Ok(WireValue(json))
    }

    /// Decodes a [`WireValue`] into a [`Value`].
    ///
    /// # Errors
    ///
    /// The wire value does not have the shape of this [`DataType`] or the
    /// decoded value violates one of its constraints.
    pub fn decode(&self, wire: &WireValue) -> Result<Value, CodecError> {
        let json = &wire.0;

        let value = match self {
            Self::Integer { .. } => json.as_i64().map(Value::Integer),
            Self::Double { .. } => json.as_f64().map(Value::Double),
            Self::String { .. } => json.as_str().map(|v| Value::String(v.into())),
            Self::Date => json
                .as_i64()
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .map(Value::Date),
            Self::Enum { .. } => json.as_str().map(|v| Value::Enum(v.into())),
            Self::Location => Location::deserialize(json).ok().map(Value::Location),
            Self::Boolean => json.as_bool().map(Value::Boolean),
        }
        .ok_or_else(|| {
            CodecError::new(
                self.name(),
                format!("cannot decode `{json}` as {} value", self.name()),
            )
        })?;

        self.validate(&value)?;
        Ok(value)
    }

    fn validate(&self, value: &Value) -> Result<(), CodecError> {
        match (self, value) {
            (Self::Integer { min, max }, Value::Integer(v)) => {
                check_bounds(self.name(), *v, *min, *max)
            }
            (Self::Double { min, max }, Value::Double(v)) => {
                if !v.is_finite() {
                    return Err(CodecError::new(self.name(), format!("{v} is not finite")));
                }
                check_bounds(self.name(), *v, *min, *max)
            }
            (Self::String { max_length }, Value::String(v)) => match max_length {
                Some(max_length) if v.chars().count() > *max_length => Err(CodecError::new(
                    self.name(),
                    format!("`{v}` is longer than {max_length} characters"),
                )),
                _ => Ok(()),
            },
            (Self::Enum { values }, Value::Enum(v)) => {
                if values.iter().any(|allowed| allowed == v) {
                    Ok(())
                } else {
                    Err(CodecError::new(
                        self.name(),
                        format!("`{v}` is not one of {values:?}"),
                    ))
                }
            }
            (Self::Location, Value::Location(v)) => {
                if v.is_valid() {
                    Ok(())
                } else {
                    Err(CodecError::new(
                        self.name(),
                        format!("{v} is outside the valid coordinate ranges"),
                    ))
                }
            }
            // Dates travel as epoch milliseconds.
            (Self::Date, Value::Date(v)) => {
                if v.timestamp_subsec_nanos() % 1_000_000 == 0 {
                    Ok(())
                } else {
                    Err(CodecError::new(
                        self.name(),
                        format!("{v} is more precise than a millisecond"),
                    ))
                }
            }
            (Self::Boolean, Value::Boolean(_)) => Ok(()),
            (_, other) => Err(CodecError::new(
                self.name(),
                format!("expected {} value, found {}", self.name(), other.kind()),
            )),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

fn check_bounds<T>(
    data_type: &'static str,
    value: T,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), CodecError>
where
    T: PartialOrd + fmt::Display + Copy,
{
    if let Some(min) = min
        && value < min
    {
        return Err(CodecError::new(
            data_type,
            format!("{value} is lower than the minimum {min}"),
        ));
    }

    if let Some(max) = max
        && value > max
    {
        return Err(CodecError::new(
            data_type,
            format!("{value} is greater than the maximum {max}"),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use serde_json::json;

    use crate::{deserialize, serialize};

    use super::{DataType, Location, Value, WireValue};

    fn mode() -> DataType {
        DataType::enumeration(["auto", "heat", "cool", "off"])
    }

    #[test]
    fn values_survive_their_codec() {
        let date = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();

        let cases = [
            (DataType::integer_range(-10, 10), Value::Integer(-3)),
            (DataType::double(), Value::Double(21.5)),
            (DataType::string(), Value::String("kitchen".into())),
            (DataType::Date, Value::Date(date)),
            (mode(), Value::Enum("auto".into())),
            (DataType::Location, Value::Location(Location::new(12.5, 41.9))),
            (DataType::Boolean, Value::Boolean(true)),
        ];

        for (data_type, value) in cases {
            let wire = data_type.encode(&value).unwrap();
            assert_eq!(data_type.decode(&wire).unwrap(), value, "{data_type}");
        }
    }

    #[test]
    fn wire_shapes() {
        let date = DateTime::<Utc>::from_timestamp_millis(86_400_000).unwrap();

        assert_eq!(
            DataType::Date.encode(&Value::Date(date)).unwrap(),
            WireValue::new(json!(86_400_000))
        );
        assert_eq!(
            DataType::Location
                .encode(&Value::Location(Location::new(1.0, 2.0)))
                .unwrap(),
            WireValue::new(json!({ "longitude": 1.0, "latitude": 2.0 }))
        );
    }

    #[test]
    fn kind_mismatch_is_never_coerced() {
        let error = DataType::double().encode(&Value::Integer(21)).unwrap_err();
        assert_eq!(error.data_type(), "double");
        assert_eq!(error.description(), "expected double value, found integer");

        assert!(mode().encode(&Value::String("auto".into())).is_err());
        assert!(
            DataType::integer()
                .decode(&WireValue::new(json!(21.5)))
                .is_err()
        );
        assert!(DataType::Boolean.decode(&WireValue::new(json!("true"))).is_err());
    }

    #[test]
    fn double_accepts_integer_json() {
        assert_eq!(
            DataType::double().decode(&WireValue::new(json!(21))).unwrap(),
            Value::Double(21.0)
        );
    }

    #[test]
    fn constraints() {
        let error = mode().encode(&Value::Enum("eco".into())).unwrap_err();
        assert_eq!(
            error.description(),
            "`eco` is not one of [\"auto\", \"heat\", \"cool\", \"off\"]"
        );

        let bounded = DataType::integer_range(0, 100);
        assert!(bounded.encode(&Value::Integer(101)).is_err());
        assert!(bounded.decode(&WireValue::new(json!(-1))).is_err());

        assert!(DataType::double().encode(&Value::Double(f64::NAN)).is_err());
        assert!(
            DataType::string_with_max_length(3)
                .encode(&Value::String("abcd".into()))
                .is_err()
        );
        assert!(
            DataType::Location
                .decode(&WireValue::new(json!({ "longitude": 200.0, "latitude": 0.0 })))
                .is_err()
        );

        let precise = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let error = DataType::Date.encode(&Value::Date(precise)).unwrap_err();
        assert_eq!(error.data_type(), "date");

        let truncated = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_000_000).unwrap();
        assert_eq!(
            DataType::Date.encode(&Value::Date(truncated)).unwrap(),
            WireValue::new(json!(1_700_000_000_123_i64))
        );
    }

    #[test]
    fn typed_extraction() {
        assert_eq!(i64::try_from(Value::Integer(5)), Ok(5));
        assert_eq!(String::try_from(Value::Enum("auto".into())), Ok("auto".into()));
        assert!(bool::try_from(Value::Double(1.0)).is_err());
    }

    #[test]
    fn data_type_metadata_format() {
        assert_eq!(
            serialize(DataType::integer_range(0, 5)),
            json!({ "type": "integer", "min": 0, "max": 5 })
        );
        assert_eq!(serialize(DataType::Date), json!({ "type": "date" }));
        assert_eq!(
            deserialize::<DataType>(json!({ "type": "enum", "values": ["on", "off"] })),
            DataType::enumeration(["on", "off"])
        );
        assert_eq!(
            deserialize::<DataType>(json!({ "type": "string", "maxLength": 8 })),
            DataType::string_with_max_length(8)
        );
    }
}
