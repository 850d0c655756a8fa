//! Generic containers for attaching bytecode locations to errors and for
//! gathering many such errors while exploration continues.

use std::fmt::{Display, Formatter};

use thiserror::Error;

/// An error that is attached to the byte offset in the bytecode of the
/// instruction that caused it.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Located<E>
where
    E: Clone,
{
    /// The byte offset in the bytecode where the error occurred.
    pub location: u32,

    /// The error data
    pub payload: E,
}

impl<E> Located<E>
where
    E: Clone,
{
    /// Re-wraps the payload into a more general error type `T` while keeping
    /// the location.
    #[must_use]
    pub fn widen<T>(self) -> Located<T>
    where
        T: Clone + From<E>,
    {
        Located {
            location: self.location,
            payload:  T::from(self.payload),
        }
    }
}

/// Displays the error prefixed by the byte offset in hexadecimal.
impl<E> Display for Located<E>
where
    E: Display + Clone,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:#06x}]: {}", self.location, self.payload)
    }
}

/// A trait for types that can have a byte-offset location attached to them.
pub trait Locatable
where
    Self: Sized,
{
    /// The return type with the attached byte-offset location.
    type Located;

    /// Attach the location described by `offset` (a byte offset in the
    /// bytecode) to the error.
    fn locate(self, offset: u32) -> Self::Located;
}

/// Allows attaching a location to the error in any result.
impl<T, E> Locatable for Result<T, E>
where
    E: std::error::Error + Clone,
{
    type Located = Result<T, Located<E>>;

    fn locate(self, offset: u32) -> Self::Located {
        self.map_err(|payload| Located {
            location: offset,
            payload,
        })
    }
}

/// A collection of errors that is kept sorted by bytecode location whenever
/// located errors are added.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub struct Errors<E> {
    payloads: Vec<E>,
}

impl<E> Errors<E> {
    /// Creates a new, empty, container for errors.
    #[must_use]
    pub fn new() -> Self {
        Self { payloads: vec![] }
    }

    /// Gets the errors contained within this container.
    #[must_use]
    pub fn payloads(&self) -> &[E] {
        self.payloads.as_slice()
    }

    /// Iterates over the contained errors.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.payloads.iter()
    }

    /// Gets the number of errors in the container.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Checks if the container holds no errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl<E> Errors<E>
where
    E: std::error::Error,
{
    /// Adds the provided `error` to the end of the container.
    pub fn add(&mut self, error: E) {
        self.payloads.push(error);
    }
}

impl<E> Errors<Located<E>>
where
    E: std::error::Error + Clone,
{
    /// Adds an error `payload` that occurred at byte `offset` in the bytecode.
    pub fn add_located(&mut self, offset: u32, payload: E) {
        self.payloads.push(Located {
            location: offset,
            payload,
        });
        self.sort();
    }

    /// Adds many located errors to the container at once.
    pub fn add_many_located(&mut self, errors: impl IntoIterator<Item = Located<E>>) {
        self.payloads.extend(errors);
        self.sort();
    }

    /// Re-wraps every payload in the more general error type `T`.
    #[must_use]
    pub fn widen<T>(self) -> Errors<Located<T>>
    where
        T: Clone + From<E>,
    {
        let payloads = self.payloads.into_iter().map(Located::widen).collect();
        Errors { payloads }
    }

    /// The sort is stable, so errors at the same location keep the order in
    /// which they were found.
    fn sort(&mut self) {
        self.payloads.sort_by_key(|item| item.location);
    }
}

impl<E> Default for Errors<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> From<E> for Errors<E>
where
    E: std::error::Error,
{
    fn from(value: E) -> Self {
        Self {
            payloads: vec![value],
        }
    }
}

impl<E> From<Errors<E>> for Vec<E> {
    fn from(value: Errors<E>) -> Self {
        value.payloads
    }
}

impl<E> From<Vec<E>> for Errors<E> {
    fn from(payloads: Vec<E>) -> Self {
        Self { payloads }
    }
}

impl<'a, E> IntoIterator for &'a Errors<E> {
    type IntoIter = std::slice::Iter<'a, E>;
    type Item = &'a E;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Prints a header with the error count, followed by one error per line.
impl<E> Display for Errors<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.payloads.is_empty() {
            return write!(f, "Encountered no errors");
        }

        writeln!(f, "Encountered {} errors:", self.payloads.len())?;
        for error in &self.payloads {
            writeln!(f, "{error}")?;
        }

        Ok(())
    }
}
