//! Registration-time checks of a method against the accepted contracts.
//!
//! The callable's signature is already fixed by the trait it implements, so
//! what remains is the route itself and the combinations of argument shape
//! and route options that cannot be expressed in types.

use axum::routing::MethodFilter;
use svcbind_binding::{ArgumentShape, MethodArgument, SchemaRules};
use svcbind_protocol::RegistrationError;

use crate::descriptor::{MethodDescriptor, ResultArity, RouteKey, RouteOptions};

/// A method that passed every check, ready to be installed.
#[derive(Debug)]
pub(crate) struct Prototype {
    pub descriptor: MethodDescriptor,
    pub filter: MethodFilter,
    pub rules: Option<SchemaRules>,
}

pub(crate) fn check<A: MethodArgument, O>(
    route: RouteKey,
    options: RouteOptions,
    arity: ResultArity,
) -> Result<Prototype, RegistrationError> {
    check_path(&route.path)?;
    let filter = MethodFilter::try_from(route.method.clone()).map_err(|_| {
        RegistrationError::UnsupportedVerb {
            route: route.to_string(),
        }
    })?;

    let argument_type = std::any::type_name::<A>();
    match (options.file_upload, A::SHAPE) {
        (true, ArgumentShape::FileList) | (false, ArgumentShape::Record | ArgumentShape::List) => {}
        (true, _) => {
            return Err(RegistrationError::FileUploadArgument {
                route: route.to_string(),
                argument: argument_type,
            });
        }
        (false, ArgumentShape::FileList) => {
            return Err(RegistrationError::FileListWithoutUpload {
                route: route.to_string(),
                argument: argument_type,
            });
        }
    }

    let rules = match &options.schema {
        None => None,
        Some(_) if A::SHAPE != ArgumentShape::Record => {
            return Err(RegistrationError::InvalidSchema {
                route: route.to_string(),
                reason: "schemas apply to record arguments only".to_owned(),
            });
        }
        Some(schema) => Some(SchemaRules::compile(schema).map_err(|reason| {
            RegistrationError::InvalidSchema {
                route: route.to_string(),
                reason,
            }
        })?),
    };

    Ok(Prototype {
        descriptor: MethodDescriptor {
            route,
            argument_type,
            argument_shape: A::SHAPE,
            result_arity: arity,
            result_type: std::any::type_name::<O>(),
            options,
        },
        filter,
        rules,
    })
}

/// Accepts `/`-rooted paths whose captures use the `{name}` or `{*name}`
/// forms.
fn check_path(path: &str) -> Result<(), RegistrationError> {
    let invalid = |reason| RegistrationError::InvalidPath {
        path: path.to_owned(),
        reason,
    };
    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if !path.starts_with('/') {
        return Err(invalid("path must start with `/`"));
    }

    let segments: Vec<&str> = path[1..].split('/').collect();
    for (index, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') || segment.starts_with('*') {
            return Err(invalid("captures use the `{name}` form"));
        }
        let opens = segment.matches('{').count();
        let closes = segment.matches('}').count();
        if opens == 0 && closes == 0 {
            continue;
        }
        let Some(name) = segment
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        else {
            return Err(invalid("a capture must span a whole segment"));
        };
        if opens != 1 || closes != 1 {
            return Err(invalid("a capture must span a whole segment"));
        }
        let name = match name.strip_prefix('*') {
            Some(_) if index + 1 != segments.len() => {
                return Err(invalid("a wildcard capture must be the last segment"));
            }
            Some(rest) => rest,
            None => name,
        };
        if name.is_empty() {
            return Err(invalid("a capture needs a name"));
        }
    }
    Ok(())
}

/// Path with capture names erased, so `/a/{x}` and `/a/{y}` compare equal.
pub(crate) fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix("{*") {
            Some(_) => "{*}",
            None if segment.starts_with('{') => "{}",
            None => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}
