//! Attribute and event templates.
//!
//! Templates are immutable. Deriving operations return a new template with
//! attributes prepended or appended and ordinals recomputed, which is how
//! meta attributes attach to any event.

use hashbrown::HashMap;
use std::sync::Arc;

use crate::types::TypeToken;

/// Reserved names of the meta attributes.
pub mod meta {
    use crate::types::TypeToken;

    /// Character encoding selector (int16). Must be the first attribute.
    pub const ENCODING: &str = "enc";
    /// Receipt time in milliseconds since the Unix epoch (int64).
    pub const RECEIPT_TIME: &str = "ReceiptTime";
    /// Sender address as seen by the listener (ip_addr).
    pub const SENDER_IP: &str = "SenderIP";
    /// Sender port as seen by the listener (uint16).
    pub const SENDER_PORT: &str = "SenderPort";
    /// Emitting site identifier (uint16).
    pub const SITE_ID: &str = "SiteID";

    /// Attributes a listener injects into every received event.
    pub const RECEIPT_ATTRIBUTES: [(&str, TypeToken); 3] = [
        (RECEIPT_TIME, TypeToken::Int64),
        (SENDER_IP, TypeToken::IpAddr),
        (SENDER_PORT, TypeToken::UInt16),
    ];

    /// Declared type of a meta attribute, if `name` is reserved.
    pub fn token_of(name: &str) -> Option<TypeToken> {
        match name {
            ENCODING => Some(TypeToken::Int16),
            RECEIPT_TIME => Some(TypeToken::Int64),
            SENDER_IP => Some(TypeToken::IpAddr),
            SENDER_PORT | SITE_ID => Some(TypeToken::UInt16),
            _ => None,
        }
    }
}

/// One attribute slot: type, name and position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeTemplate {
    token: TypeToken,
    name: String,
    ordinal: usize,
}

impl AttributeTemplate {
    #[inline]
    pub fn token(&self) -> TypeToken {
        self.token
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

/// Event name plus its ordered attribute templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    name: String,
    attributes: Vec<AttributeTemplate>,
    index: HashMap<String, usize>,
}

impl EventTemplate {
    /// Build a template. Ordinals follow the order given; a repeated name
    /// keeps its first declaration.
    pub fn new<N, I>(name: impl Into<String>, attributes: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeToken)>,
    {
        let mut template = Self::empty(name);
        for (attr, token) in attributes {
            template.push(attr.into(), token);
        }
        template
    }

    /// A template with no attributes.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, name: String, token: TypeToken) -> bool {
        if self.index.contains_key(&name) {
            return false;
        }
        let ordinal = self.attributes.len();
        self.index.insert(name.clone(), ordinal);
        self.attributes.push(AttributeTemplate {
            token,
            name,
            ordinal,
        });
        true
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn attributes(&self) -> &[AttributeTemplate] {
        &self.attributes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    #[inline]
    pub fn ordinal_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &str) -> Option<&AttributeTemplate> {
        self.ordinal_of(name).map(|i| &self.attributes[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// New template with `extra` after the existing attributes. Names
    /// already present are skipped.
    pub fn with_appended<N, I>(&self, extra: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeToken)>,
    {
        let mut template = self.clone();
        for (name, token) in extra {
            template.push(name.into(), token);
        }
        template
    }

    /// New template with `extra` in front. An existing attribute of the
    /// same name moves to the front and takes the new declaration.
    pub fn with_prepended<N, I>(&self, extra: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, TypeToken)>,
    {
        let mut template = Self::empty(self.name.clone());
        for (name, token) in extra {
            template.push(name.into(), token);
        }
        for attr in &self.attributes {
            template.push(attr.name.clone(), attr.token);
        }
        template
    }

    /// This template with the `enc` attribute in first position.
    pub fn with_encoding(&self) -> Self {
        if self.ordinal_of(meta::ENCODING) == Some(0) {
            return self.clone();
        }
        self.with_prepended([(meta::ENCODING, TypeToken::Int16)])
    }

    /// This template extended with the receipt meta attributes.
    pub fn with_receipt_metadata(&self) -> Self {
        self.with_appended(meta::RECEIPT_ATTRIBUTES)
    }
}

/// Shared, immutable template handle.
pub type TemplateRef = Arc<EventTemplate>;
