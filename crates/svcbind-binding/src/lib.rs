//! # svcbind-binding — argument resolution
//!
//! Builds one bound argument per request. Sources merge in fixed precedence
//! (query string, then body, then path captures) before the argument is
//! deserialized and validated. File-upload routes read the body as multipart
//! instead.
//!
//! ## Module Overview
//!
//! - [`fields`] — `FieldSet` and the case-insensitive, text-coercing deserializer
//! - [`decoder`] — `BodyDecoder` plus the JSON and form decoders
//! - [`multipart`] — file-upload reading
//! - [`validation`] — `Violation`, `SchemaRules`
//! - [`resolver`] — `ArgumentResolver`, the pipeline itself

pub mod decoder;
pub mod fields;
pub mod multipart;
pub mod resolver;
pub mod validation;

use serde::Serialize;
use serde::de::DeserializeOwned;
use svcbind_protocol::{BindingError, UploadedFile, UploadedFiles};

pub use decoder::{BodyDecoder, DecodedBody, FormBodyDecoder, JsonBodyDecoder};
pub use fields::{FieldSet, FieldValue};
pub use resolver::{ArgumentResolver, ResolveOptions, Resolved};
pub use validation::{SchemaRules, Violation};

/// The structured container an argument is bound into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentShape {
    Record,
    List,
    FileList,
}

/// Everything the resolver gathered for one request.
#[derive(Debug)]
pub enum ArgumentSource {
    Fields(FieldSet),
    Files(Vec<UploadedFile>),
}

impl ArgumentSource {
    pub fn into_record<T: DeserializeOwned>(self) -> Result<T, BindingError> {
        match self {
            Self::Fields(fields) => fields.into_record(),
            Self::Files(_) => Err(BindingError::Decode(
                "a record argument cannot bind uploaded files".to_owned(),
            )),
        }
    }

    pub fn into_list<T: DeserializeOwned>(self) -> Result<Vec<T>, BindingError> {
        match self {
            Self::Fields(fields) => fields.into_list(),
            Self::Files(_) => Err(BindingError::Decode(
                "a list argument cannot bind uploaded files".to_owned(),
            )),
        }
    }

    pub fn into_files(self) -> Result<Vec<UploadedFile>, BindingError> {
        match self {
            Self::Files(files) => Ok(files),
            Self::Fields(_) => Err(BindingError::Multipart(
                "uploaded files are only bound in file upload mode".to_owned(),
            )),
        }
    }
}

/// A type a method can take as its argument.
///
/// Record arguments keep the default shape and bind with
/// [`ArgumentSource::into_record`]:
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Greeting { name: String }
///
/// impl MethodArgument for Greeting {
///     fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
///         source.into_record()
///     }
/// }
/// ```
///
/// Lists and uploads are covered by the impls on `Vec<T>` and
/// [`UploadedFiles`].
pub trait MethodArgument: Serialize + Send + Sized + 'static {
    const SHAPE: ArgumentShape = ArgumentShape::Record;

    fn bind(source: ArgumentSource) -> Result<Self, BindingError>;

    /// Field rules checked after binding. Only record arguments are
    /// validated.
    fn validate(&self) -> Result<(), Vec<Violation>> {
        Ok(())
    }
}

impl<T> MethodArgument for Vec<T>
where
    T: DeserializeOwned + Serialize + Send + 'static,
{
    const SHAPE: ArgumentShape = ArgumentShape::List;

    fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
        source.into_list()
    }
}

impl MethodArgument for UploadedFiles {
    const SHAPE: ArgumentShape = ArgumentShape::FileList;

    fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
        source.into_files().map(UploadedFiles)
    }
}
