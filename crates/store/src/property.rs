//! Property capability contract and the typed converting adapter.
//!
//! Every property exposes a name and a retrieval cost. Reading and writing
//! are separate capabilities discovered through [`Property::as_readable`]
//! and [`Property::as_writable`]. Typed properties are not a parallel
//! hierarchy: [`ConvertingProperty`] composes a [`ValueSource`] with a
//! [`PropertyConverter`] and implements the untyped contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use davis_core::error::{DavError, DavResult};
use davis_core::{PropertyName, WireElement};
use std::marker::PhantomData;

/// Cost of properties included in broad `allprop` queries.
pub const CHEAP: u32 = 0;

pub trait Property: Send + Sync {
    fn name(&self) -> &PropertyName;

    /// `0` means cheap; anything higher is only returned when asked for by name.
    fn cost(&self) -> u32 {
        CHEAP
    }

    fn as_readable(&self) -> Option<&dyn ReadableProperty> {
        None
    }

    fn as_writable(&self) -> Option<&dyn WritableProperty> {
        None
    }
}

#[async_trait]
pub trait ReadableProperty: Send + Sync {
    async fn get_wire_value(&self) -> DavResult<WireElement>;
}

#[async_trait]
pub trait WritableProperty: Send + Sync {
    async fn set_wire_value(&self, value: WireElement) -> DavResult<()>;
}

// ---------------------------------------------------------------------------
// Converters
// ---------------------------------------------------------------------------

/// Leaf conversion between a native value and its wire element.
pub trait PropertyConverter<T>: Send + Sync {
    fn to_element(&self, name: &PropertyName, value: &T) -> WireElement;
    fn from_element(&self, element: &WireElement) -> DavResult<T>;
}

fn element_text(element: &WireElement) -> DavResult<&str> {
    element
        .text
        .as_deref()
        .ok_or_else(|| DavError::InvalidInput(format!("{} has no text value", element.name)))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringConverter;

impl PropertyConverter<String> for StringConverter {
    fn to_element(&self, name: &PropertyName, value: &String) -> WireElement {
        WireElement::text(name.clone(), value.as_str())
    }

    fn from_element(&self, element: &WireElement) -> DavResult<String> {
        Ok(element.text.clone().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct U64Converter;

impl PropertyConverter<u64> for U64Converter {
    fn to_element(&self, name: &PropertyName, value: &u64) -> WireElement {
        WireElement::text(name.clone(), value.to_string())
    }

    fn from_element(&self, element: &WireElement) -> DavResult<u64> {
        let text = element_text(element)?;
        text.trim().parse().map_err(|e| {
            DavError::InvalidInput(format!("{} is not an integer: {e}", element.name))
        })
    }
}

/// RFC 1123 dates, as used by `getlastmodified`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeConverter;

impl PropertyConverter<DateTime<Utc>> for DateTimeConverter {
    fn to_element(&self, name: &PropertyName, value: &DateTime<Utc>) -> WireElement {
        WireElement::text(
            name.clone(),
            value.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        )
    }

    fn from_element(&self, element: &WireElement) -> DavResult<DateTime<Utc>> {
        let text = element_text(element)?;
        DateTime::parse_from_rfc2822(text.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| DavError::InvalidInput(format!("{} is not a date: {e}", element.name)))
    }
}

// ---------------------------------------------------------------------------
// Typed adapter
// ---------------------------------------------------------------------------

/// Native-typed value behind a [`ConvertingProperty`].
#[async_trait]
pub trait ValueSource<T: Send + 'static>: Send + Sync {
    async fn get_value(&self) -> DavResult<T>;

    fn is_writable(&self) -> bool {
        false
    }

    async fn set_value(&self, _value: T) -> DavResult<()> {
        Err(DavError::Internal("value source is read-only".into()))
    }
}

/// Read-only value computed on demand.
pub struct Computed<F>(pub F);

#[async_trait]
impl<T, F> ValueSource<T> for Computed<F>
where
    T: Send + 'static,
    F: Fn() -> DavResult<T> + Send + Sync,
{
    async fn get_value(&self) -> DavResult<T> {
        (self.0)()
    }
}

/// Adapts a typed source to the untyped readable (and, if the source allows,
/// writable) contract.
pub struct ConvertingProperty<T, S, C> {
    name: PropertyName,
    cost: u32,
    source: S,
    converter: C,
    _value: PhantomData<fn() -> T>,
}

impl<T, S, C> ConvertingProperty<T, S, C>
where
    T: Send + 'static,
    S: ValueSource<T>,
    C: PropertyConverter<T>,
{
    pub fn new(name: PropertyName, cost: u32, source: S, converter: C) -> Self {
        Self {
            name,
            cost,
            source,
            converter,
            _value: PhantomData,
        }
    }

    pub async fn get_value(&self) -> DavResult<T> {
        self.source.get_value().await
    }
}

impl<T, S, C> Property for ConvertingProperty<T, S, C>
where
    T: Send + 'static,
    S: ValueSource<T>,
    C: PropertyConverter<T>,
{
    fn name(&self) -> &PropertyName {
        &self.name
    }

    fn cost(&self) -> u32 {
        self.cost
    }

    fn as_readable(&self) -> Option<&dyn ReadableProperty> {
        Some(self)
    }

    fn as_writable(&self) -> Option<&dyn WritableProperty> {
        self.source.is_writable().then_some(self as &dyn WritableProperty)
    }
}

#[async_trait]
impl<T, S, C> ReadableProperty for ConvertingProperty<T, S, C>
where
    T: Send + 'static,
    S: ValueSource<T>,
    C: PropertyConverter<T>,
{
    async fn get_wire_value(&self) -> DavResult<WireElement> {
        let value = self.source.get_value().await?;
        Ok(self.converter.to_element(&self.name, &value))
    }
}

#[async_trait]
impl<T, S, C> WritableProperty for ConvertingProperty<T, S, C>
where
    T: Send + 'static,
    S: ValueSource<T>,
    C: PropertyConverter<T>,
{
    async fn set_wire_value(&self, value: WireElement) -> DavResult<()> {
        if !self.source.is_writable() {
            return Err(DavError::ReadOnlyProperty(self.name.to_string()));
        }
        let value = self.converter.from_element(&value)?;
        self.source.set_value(value).await
    }
}

// ---------------------------------------------------------------------------
// Untyped
// ---------------------------------------------------------------------------

/// Client-managed property stored only in its wire form.
pub struct DeadProperty {
    name: PropertyName,
    value: tokio::sync::RwLock<WireElement>,
}

impl DeadProperty {
    pub fn new(value: WireElement) -> Self {
        Self {
            name: value.name.clone(),
            value: tokio::sync::RwLock::new(value),
        }
    }
}

impl Property for DeadProperty {
    fn name(&self) -> &PropertyName {
        &self.name
    }

    fn as_readable(&self) -> Option<&dyn ReadableProperty> {
        Some(self)
    }

    fn as_writable(&self) -> Option<&dyn WritableProperty> {
        Some(self)
    }
}

#[async_trait]
impl ReadableProperty for DeadProperty {
    async fn get_wire_value(&self) -> DavResult<WireElement> {
        Ok(self.value.read().await.clone())
    }
}

#[async_trait]
impl WritableProperty for DeadProperty {
    async fn set_wire_value(&self, value: WireElement) -> DavResult<()> {
        if value.name != self.name {
            return Err(DavError::InvalidInput(format!(
                "cannot store {} under {}",
                value.name, self.name
            )));
        }
        *self.value.write().await = value;
        Ok(())
    }
}
