//! The argument resolution pipeline.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use svcbind_protocol::BindingError;
use tracing::{debug, instrument};

use crate::decoder::{self, BodyDecoder, DecodedBody, FormBodyDecoder, JsonBodyDecoder};
use crate::fields::{FieldSet, FieldValue};
use crate::multipart;
use crate::validation::{self, SchemaRules};
use crate::{ArgumentShape, ArgumentSource, MethodArgument};

/// Per-route switches the resolver honours.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions<'a> {
    /// Leave the body unread for the method.
    pub bypass_request_body: bool,
    /// Read the body as multipart and bind only uploaded files.
    pub file_upload: bool,
    pub max_body_bytes: usize,
    pub rules: Option<&'a SchemaRules>,
}

/// A bound argument plus the request body when nothing consumed it.
#[derive(Debug)]
pub struct Resolved<A> {
    pub argument: A,
    pub unread_body: Option<Body>,
}

/// Resolves arguments using a fixed set of body decoders.
#[derive(Clone)]
pub struct ArgumentResolver {
    decoders: Vec<Arc<dyn BodyDecoder>>,
}

impl Default for ArgumentResolver {
    fn default() -> Self {
        Self::empty()
            .with_decoder(JsonBodyDecoder)
            .with_decoder(FormBodyDecoder)
    }
}

impl std::fmt::Debug for ArgumentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let media_types: Vec<_> = self.decoders.iter().map(|d| d.media_type()).collect();
        f.debug_struct("ArgumentResolver")
            .field("decoders", &media_types)
            .finish()
    }
}

impl ArgumentResolver {
    /// A resolver that decodes no bodies at all.
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Adds a decoder. A later decoder for the same media type wins.
    pub fn with_decoder(mut self, decoder: impl BodyDecoder + 'static) -> Self {
        self.decoders.insert(0, Arc::new(decoder));
        self
    }

    fn decoder_for(&self, media_type: &str) -> Option<&dyn BodyDecoder> {
        self.decoders
            .iter()
            .find(|decoder| decoder.media_type() == media_type)
            .map(|decoder| decoder.as_ref())
    }

    /// Binds `A` from `request`. Path captures are supplied by the router.
    #[instrument(
        level = "debug",
        skip_all,
        fields(argument = std::any::type_name::<A>())
    )]
    pub async fn resolve<A: MethodArgument>(
        &self,
        request: Request,
        path_params: &[(String, String)],
        options: ResolveOptions<'_>,
    ) -> Result<Resolved<A>, BindingError> {
        if options.file_upload {
            let files = multipart::read_uploads(request, options.max_body_bytes).await?;
            debug!(files = files.len(), "bound uploaded files");
            return Ok(Resolved {
                argument: A::bind(ArgumentSource::Files(files))?,
                unread_body: None,
            });
        }

        let (parts, body) = request.into_parts();
        let mut fields = FieldSet::new();

        if let Some(query) = parts.uri.query() {
            fields.merge(decoder::parse_form(query.as_bytes())?);
        }

        let decoder = if options.bypass_request_body {
            None
        } else {
            decoder::media_type(&parts.headers).and_then(|media| self.decoder_for(&media))
        };
        let unread_body = match decoder {
            Some(decoder) => {
                let bytes = axum::body::to_bytes(body, options.max_body_bytes)
                    .await
                    .map_err(|error| BindingError::Body(error.to_string()))?;
                match decoder.decode(&bytes)? {
                    DecodedBody::Fields(_) if A::SHAPE == ArgumentShape::List => {
                        return Err(BindingError::Body(
                            "expected a JSON array for a list argument".to_owned(),
                        ));
                    }
                    DecodedBody::Fields(decoded) => fields.merge(decoded),
                    DecodedBody::Value(value) => fields.set_whole(value),
                }
                None
            }
            None => Some(body),
        };

        fields.merge(
            path_params
                .iter()
                .map(|(name, value)| (name.clone(), FieldValue::text(value.clone()))),
        );

        let argument = A::bind(ArgumentSource::Fields(fields))?;
        if A::SHAPE == ArgumentShape::Record {
            validate_record(&argument, options.rules)?;
        }
        Ok(Resolved {
            argument,
            unread_body,
        })
    }
}

fn validate_record<A: MethodArgument>(
    argument: &A,
    rules: Option<&SchemaRules>,
) -> Result<(), BindingError> {
    let mut violations = argument.validate().err().unwrap_or_default();
    if let Some(rules) = rules {
        let instance = serde_json::to_value(argument).map_err(|error| {
            BindingError::Validation(format!("argument is not serializable: {error}"))
        })?;
        violations.extend(rules.check(&instance));
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(BindingError::Validation(validation::render(&violations)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Violation;
    use crate::multipart::tests::{ONE_FILE_ONE_FIELD, multipart_request};
    use axum::http::header::CONTENT_TYPE;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use svcbind_protocol::UploadedFiles;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[allow(non_snake_case)]
    struct Args {
        A: i64,
        #[serde(default)]
        tag: String,
    }

    impl MethodArgument for Args {
        fn bind(source: ArgumentSource) -> Result<Self, BindingError> {
            source.into_record()
        }

        fn validate(&self) -> Result<(), Vec<Violation>> {
            if self.tag == "forbidden" {
                return Err(vec![Violation::field("tag", "must not be `forbidden`")]);
            }
            Ok(())
        }
    }

    const OPTIONS: ResolveOptions<'static> = ResolveOptions {
        bypass_request_body: false,
        file_upload: false,
        max_body_bytes: 1024,
        rules: None,
    };

    fn request(uri: &str, content_type: Option<&str>, body: &str) -> Request {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(Body::from(body.to_owned())).unwrap()
    }

    fn path(params: &[(&str, &str)]) -> Vec<(String, String)> {
        params
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect()
    }

    async fn resolve<A: MethodArgument>(
        request: Request,
        params: &[(&str, &str)],
        options: ResolveOptions<'_>,
    ) -> Result<Resolved<A>, BindingError> {
        ArgumentResolver::default()
            .resolve(request, &path(params), options)
            .await
    }

    #[tokio::test]
    async fn path_beats_body_beats_query() {
        let json = Some("application/json");

        let resolved: Resolved<Args> = resolve(
            request("/x?A=1&tag=q", json, r#"{"a": 2}"#),
            &[("A", "3")],
            OPTIONS,
        )
        .await
        .unwrap();
        assert_eq!(resolved.argument, Args { A: 3, tag: "q".into() });
        assert!(resolved.unread_body.is_none());

        let resolved: Resolved<Args> =
            resolve(request("/x?A=1", json, r#"{"A": 2}"#), &[], OPTIONS)
                .await
                .unwrap();
        assert_eq!(resolved.argument.A, 2);
    }

    #[tokio::test]
    async fn malformed_query_fails_binding() {
        let error = resolve::<Args>(request("/x?A=%zz", None, ""), &[], OPTIONS)
            .await
            .unwrap_err();
        assert!(matches!(error, BindingError::Decode(_)), "{error}");

        let error = resolve::<Args>(request("/x?A=1&tag=%ff", None, ""), &[], OPTIONS)
            .await
            .unwrap_err();
        assert!(matches!(error, BindingError::Decode(_)), "{error}");
    }

    #[tokio::test]
    async fn form_bodies_merge_like_json() {
        let resolved: Resolved<Args> = resolve(
            request("/x?A=1", Some("application/x-www-form-urlencoded"), "A=5&tag=f"),
            &[],
            OPTIONS,
        )
        .await
        .unwrap();
        assert_eq!(resolved.argument, Args { A: 5, tag: "f".into() });
    }

    #[tokio::test]
    async fn malformed_json_is_a_body_fault() {
        let error = resolve::<Args>(request("/x", Some("application/json"), "{"), &[], OPTIONS)
            .await
            .unwrap_err();
        assert!(matches!(error, BindingError::Body(_)));

        let error = resolve::<Args>(request("/x?A=1", Some("application/json"), ""), &[], OPTIONS)
            .await
            .unwrap_err();
        assert!(matches!(error, BindingError::Body(_)));
    }

    #[tokio::test]
    async fn unknown_media_type_leaves_body_unread() {
        let resolved: Resolved<Args> =
            resolve(request("/x?A=4", Some("text/plain"), "raw"), &[], OPTIONS)
                .await
                .unwrap();
        assert_eq!(resolved.argument.A, 4);
        let body = axum::body::to_bytes(resolved.unread_body.unwrap(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"raw");
    }

    #[tokio::test]
    async fn bypass_skips_body_decoding() {
        let options = ResolveOptions {
            bypass_request_body: true,
            ..OPTIONS
        };
        let resolved: Resolved<Args> = resolve(
            request("/x?A=1", Some("application/json"), "not even json"),
            &[],
            options,
        )
        .await
        .unwrap();
        assert_eq!(resolved.argument.A, 1);
        assert!(resolved.unread_body.is_some());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let options = ResolveOptions {
            max_body_bytes: 8,
            ..OPTIONS
        };
        let error = resolve::<Args>(
            request("/x", Some("application/json"), r#"{"A": 1, "tag": "long"}"#),
            &[],
            options,
        )
        .await
        .unwrap_err();
        assert!(matches!(error, BindingError::Body(_)));
    }

    #[tokio::test]
    async fn missing_required_field_fails_binding() {
        let error = resolve::<Args>(request("/x", Some("application/json"), "{}"), &[], OPTIONS)
            .await
            .unwrap_err();
        assert!(error.to_string().contains('A'), "{error}");
    }

    #[tokio::test]
    async fn type_hook_and_schema_both_validate() {
        let error = resolve::<Args>(request("/x?A=1&tag=forbidden", None, ""), &[], OPTIONS)
            .await
            .unwrap_err();
        assert!(matches!(error, BindingError::Validation(ref m) if m.contains("`tag`")));

        let rules = SchemaRules::compile(&json!({
            "type": "object",
            "properties": { "A": { "minimum": 10 } }
        }))
        .unwrap();
        let options = ResolveOptions {
            rules: Some(&rules),
            ..OPTIONS
        };
        let error = resolve::<Args>(request("/x?A=1", None, ""), &[], options)
            .await
            .unwrap_err();
        assert!(matches!(error, BindingError::Validation(ref m) if m.contains("10")));

        let resolved: Resolved<Args> = resolve(request("/x?A=11", None, ""), &[], options)
            .await
            .unwrap();
        assert_eq!(resolved.argument.A, 11);
    }

    #[tokio::test]
    async fn list_arguments_bind_from_array_bodies() {
        let resolved: Resolved<Vec<u32>> = resolve(
            request("/x?ignored=1", Some("application/json"), "[1, 2, 3]"),
            &[("id", "9")],
            OPTIONS,
        )
        .await
        .unwrap();
        assert_eq!(resolved.argument, vec![1, 2, 3]);

        let error = resolve::<Vec<u32>>(
            request("/x", Some("application/json"), r#"{"a": 1}"#),
            &[],
            OPTIONS,
        )
        .await
        .unwrap_err();
        assert!(matches!(error, BindingError::Body(_)));
    }

    #[tokio::test]
    async fn file_upload_mode_binds_only_files() {
        let options = ResolveOptions {
            file_upload: true,
            ..OPTIONS
        };
        let resolved: Resolved<UploadedFiles> =
            resolve(multipart_request(ONE_FILE_ONE_FIELD), &[("id", "1")], options)
                .await
                .unwrap();
        assert_eq!(resolved.argument.len(), 1);
        assert_eq!(resolved.argument[0].file_name, "hosts");
    }
}
