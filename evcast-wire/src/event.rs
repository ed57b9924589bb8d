//! Events: a template plus the values set against it.
//!
//! Values are mutated in place. Setting a name the template does not know
//! extends the template (a derived copy, so shared templates are never
//! touched) and appends the value. Events created with validation on
//! refuse such names instead; meta attributes are always accepted.

use std::fmt;
use std::sync::Arc;

use evcast_core::error::{EvcastError, Result, WireFormatError};

use crate::encoding::CharacterEncoding;
use crate::template::{meta, AttributeTemplate, EventTemplate, TemplateRef};
use crate::types::TypeToken;
use crate::value::{AttributeType, AttributeValue};

#[derive(Debug, Clone)]
pub struct Event {
    template: TemplateRef,
    /// Positionally aligned with `template.attributes()`.
    values: Vec<Option<AttributeValue>>,
    encoding: CharacterEncoding,
    validate: bool,
}

fn mismatch(attribute: &str, expected: TypeToken, actual: TypeToken) -> EvcastError {
    EvcastError::TypeMismatch {
        attribute: attribute.to_string(),
        expected: expected.name(),
        actual: actual.name(),
    }
}

impl Event {
    /// An empty event with an ad hoc template.
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_template(Arc::new(EventTemplate::empty(name)))
    }

    /// An event with every attribute of `template` unset.
    pub fn from_template(template: TemplateRef) -> Self {
        Self {
            values: vec![None; template.len()],
            template,
            encoding: CharacterEncoding::default(),
            validate: false,
        }
    }

    /// Reject attributes the template does not declare.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.template.name()
    }

    #[inline]
    pub fn template(&self) -> &TemplateRef {
        &self.template
    }

    #[inline]
    pub fn encoding(&self) -> CharacterEncoding {
        self.encoding
    }

    #[inline]
    pub fn validates(&self) -> bool {
        self.validate
    }

    /// Number of attributes with a value.
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Set attributes in template order.
    pub fn attributes(&self) -> impl Iterator<Item = (&AttributeTemplate, &AttributeValue)> {
        self.template
            .attributes()
            .iter()
            .zip(&self.values)
            .filter_map(|(attr, value)| value.as_ref().map(|v| (attr, v)))
    }

    pub fn value(&self, name: &str) -> Option<&AttributeValue> {
        let ordinal = self.template.ordinal_of(name)?;
        self.values[ordinal].as_ref()
    }

    /// Typed read. `Ok(None)` if the attribute is unset; `TypeMismatch` if
    /// the stored value cannot be coerced to `T`.
    pub fn get<T: AttributeType>(&self, name: &str) -> Result<Option<T>> {
        let Some(value) = self.value(name) else {
            return Ok(None);
        };
        value
            .coerce_to(T::TOKEN)
            .and_then(T::from_value)
            .map(Some)
            .ok_or_else(|| mismatch(name, T::TOKEN, value.token()))
    }

    /// Set `name` to `value`, coercing to the declared type.
    pub fn set(&mut self, name: &str, value: impl Into<AttributeValue>) -> Result<()> {
        self.set_value(name, value.into())
    }

    /// Chaining form of [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Result<Self> {
        self.set_value(name, value.into())?;
        Ok(self)
    }

    pub fn set_value(&mut self, name: &str, value: AttributeValue) -> Result<()> {
        if name == meta::ENCODING {
            return self.set_encoding_value(&value);
        }
        if let Some(ordinal) = self.template.ordinal_of(name) {
            let declared = self.template.attributes()[ordinal].token();
            let coerced = value
                .coerce_to(declared)
                .ok_or_else(|| mismatch(name, declared, value.token()))?;
            self.values[ordinal] = Some(coerced);
            return Ok(());
        }

        let declared = meta::token_of(name);
        if self.validate && declared.is_none() {
            return Err(EvcastError::UnknownAttribute {
                event: self.name().to_string(),
                attribute: name.to_string(),
            });
        }
        let token = declared.unwrap_or_else(|| value.token());
        let coerced = value
            .coerce_to(token)
            .ok_or_else(|| mismatch(name, token, value.token()))?;
        self.extend(name, token, coerced);
        Ok(())
    }

    /// Switch the encoding used for string values. Also records the `enc`
    /// attribute in first position.
    pub fn set_encoding(&mut self, encoding: CharacterEncoding) {
        if self.template.ordinal_of(meta::ENCODING) != Some(0) {
            let template = self.template.with_encoding();
            self.retemplate(template);
        }
        self.values[0] = Some(AttributeValue::Int16(encoding.selector()));
        self.encoding = encoding;
    }

    fn set_encoding_value(&mut self, value: &AttributeValue) -> Result<()> {
        let selector = match value.coerce_to(TypeToken::Int16) {
            Some(AttributeValue::Int16(s)) => s,
            _ => return Err(mismatch(meta::ENCODING, TypeToken::Int16, value.token())),
        };
        let encoding =
            CharacterEncoding::from_selector(selector).ok_or(EvcastError::InvalidEncoding(selector))?;
        self.set_encoding(encoding);
        Ok(())
    }

    /// Clear `name`, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<AttributeValue> {
        let ordinal = self.template.ordinal_of(name)?;
        let previous = self.values[ordinal].take();
        if name == meta::ENCODING {
            self.encoding = CharacterEncoding::default();
        }
        previous
    }

    /// Store a value read off the wire.
    pub(crate) fn put_decoded(
        &mut self,
        name: &str,
        value: AttributeValue,
    ) -> std::result::Result<(), WireFormatError> {
        match self.template.ordinal_of(name) {
            Some(ordinal) => {
                let declared = self.template.attributes()[ordinal].token();
                let coerced =
                    value
                        .coerce_to(declared)
                        .ok_or_else(|| WireFormatError::TypeConflict {
                            attribute: name.to_string(),
                            expected: declared.name(),
                            actual: value.token().name(),
                        })?;
                self.values[ordinal] = Some(coerced);
            }
            None => {
                let token = value.token();
                self.extend(name, token, value);
            }
        }
        Ok(())
    }

    fn extend(&mut self, name: &str, token: TypeToken, value: AttributeValue) {
        self.template = Arc::new(self.template.with_appended([(name, token)]));
        self.values.push(Some(value));
    }

    fn retemplate(&mut self, template: EventTemplate) {
        let mut values = vec![None; template.len()];
        for (attr, value) in self.template.attributes().iter().zip(self.values.drain(..)) {
            if let Some(ordinal) = template.ordinal_of(attr.name()) {
                values[ordinal] = value;
            }
        }
        self.template = Arc::new(template);
        self.values = values;
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.encoding == other.encoding
            && self.attributes().eq(other.attributes())
    }
}

impl Eq for Event {}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name())?;
        writeln!(f, "{{")?;
        for (attr, value) in self.attributes() {
            writeln!(f, "\t{} = {};", attr.name(), value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn login_template() -> TemplateRef {
        Arc::new(EventTemplate::new(
            "UserLogin",
            [
                ("username", TypeToken::String),
                ("password", TypeToken::UInt64),
                ("clientIP", TypeToken::IpAddr),
                ("successful", TypeToken::Boolean),
            ],
        ))
    }

    #[test]
    fn set_coerces_to_declared_type() {
        let mut event = Event::from_template(login_template());
        event.set("password", 42u16).unwrap();
        assert_eq!(event.value("password"), Some(&AttributeValue::UInt64(42)));
        event.set("clientIP", "10.0.0.1").unwrap();
        assert_eq!(event.get::<Ipv4Addr>("clientIP").unwrap(), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn set_without_coercion_path_is_type_mismatch() {
        let mut event = Event::from_template(login_template());
        let err = event.set("successful", Ipv4Addr::LOCALHOST).unwrap_err();
        assert!(matches!(
            err,
            EvcastError::TypeMismatch { expected: "boolean", actual: "ip_addr", .. }
        ));
        assert_eq!(event.value("successful"), None);
    }

    #[test]
    fn unknown_attribute_extends_template() {
        let template = login_template();
        let mut event = Event::from_template(Arc::clone(&template));
        event.set("attempts", 3i32).unwrap();
        assert_eq!(event.template().ordinal_of("attempts"), Some(4));
        assert_eq!(template.len(), 4, "shared template must not change");
        assert_eq!(event.get::<i64>("attempts").unwrap(), Some(3));
    }

    #[test]
    fn validating_event_rejects_unknown_attribute() {
        let mut event = Event::from_template(login_template()).with_validation(true);
        let err = event.set("attempts", 3i32).unwrap_err();
        assert!(matches!(err, EvcastError::UnknownAttribute { .. }));
        event.set(meta::SITE_ID, 7u16).unwrap();
    }

    #[test]
    fn encoding_attribute_goes_first() {
        let mut event = Event::new("Greeting").with("text", "hola").unwrap();
        event.set("enc", 0i16).unwrap();
        assert_eq!(event.encoding(), CharacterEncoding::Iso8859_1);
        assert_eq!(event.template().ordinal_of("enc"), Some(0));
        assert_eq!(event.get::<String>("text").unwrap().as_deref(), Some("hola"));

        assert!(matches!(event.set("enc", 5i16), Err(EvcastError::InvalidEncoding(5))));
        event.remove("enc");
        assert_eq!(event.encoding(), CharacterEncoding::Utf8);
    }

    #[test]
    fn get_reports_failed_coercion() {
        let event = Event::new("E").with("n", -1i32).unwrap();
        assert!(event.get::<u32>("n").is_err());
        assert_eq!(event.get::<i16>("n").unwrap(), Some(-1));
        assert_eq!(event.get::<i16>("absent").unwrap(), None);
    }

    #[test]
    fn display_lists_set_attributes() {
        let event = Event::new("Ping")
            .with("seq", 1u32)
            .unwrap()
            .with("ok", true)
            .unwrap();
        assert_eq!(event.to_string(), "Ping\n{\n\tseq = 1;\n\tok = true;\n}");
    }
}
