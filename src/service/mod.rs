//! Request orchestration
//!
//! Authenticates the caller once per request, compiles each root field,
//! hands the statement to an [`Executor`], and folds the rows back into the
//! requested shape. Query fields fail independently; a mutation request
//! stops at its first failure and returns no data.

pub mod models;

use serde_json::{Map, Value};
use std::sync::Arc;

use crate::auth::{Claims, ClaimsVerifier, UnverifiedJwtDecoder, GLOBAL_AUTH_MESSAGE};
use crate::config::CompilerConfig;
use crate::errors::TranslationError;
use crate::execution::{ExecutionRequest, Executor};
use crate::graph_catalog::GraphSchema;
use crate::translate::{CompiledStatement, OperationKind, Translator};

pub use models::{ErrorItem, GraphRequest, GraphResponse, RequestKind, RootField, StatementOutput};

pub struct GraphService {
    schema: Arc<GraphSchema>,
    config: CompilerConfig,
    verifier: Box<dyn ClaimsVerifier>,
}

impl GraphService {
    /// Service decoding tokens without signature checks; replace the
    /// verifier with [`GraphService::with_verifier`] outside development.
    pub fn new(schema: Arc<GraphSchema>, config: CompilerConfig) -> Self {
        let verifier = Box::new(UnverifiedJwtDecoder::new(config.roles_claim_path.clone()));
        GraphService {
            schema,
            config,
            verifier,
        }
    }

    pub fn with_verifier(mut self, verifier: impl ClaimsVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn schema(&self) -> &GraphSchema {
        &self.schema
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Claims for `token`. A missing or invalid token means no claims,
    /// which global authentication turns into an error.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Option<Claims>, TranslationError> {
        let claims = match token {
            Some(token) => match self.verifier.verify(token) {
                Ok(claims) => {
                    log::debug!("Authenticated caller with roles {:?}", claims.roles);
                    Some(claims)
                }
                Err(e) => {
                    log::info!("Ignoring invalid token: {}", e);
                    None
                }
            },
            None => None,
        };
        if claims.is_none() && self.config.global_authentication {
            log::info!("Rejecting request without claims under global authentication");
            return Err(TranslationError::Authentication(GLOBAL_AUTH_MESSAGE.to_string()));
        }
        Ok(claims)
    }

    pub fn translate(
        &self,
        field: &RootField,
        claims: Option<&Claims>,
    ) -> Result<CompiledStatement, TranslationError> {
        let translator = Translator::with_config(&self.schema, claims, &self.config);
        let mut compiled = translator.translate(field.operation, &field.node_type, &field.selection)?;
        if field.operation == OperationKind::Read {
            if let Some(mode) = self.config.default_access_mode {
                compiled.access_mode = mode;
            }
        }
        Ok(compiled)
    }

    pub async fn execute(&self, request: &GraphRequest, executor: &dyn Executor) -> GraphResponse {
        let claims = match self.authenticate(request.token.as_deref()) {
            Ok(claims) => claims,
            Err(e) => return GraphResponse::failed(&e),
        };

        let mut data = Map::new();
        let mut errors = Vec::new();
        for field in &request.fields {
            let key = field.selection.response_key().to_string();
            match self.resolve(field, claims.as_ref(), executor).await {
                Ok(value) => {
                    data.insert(key, value);
                }
                Err(e) if request.kind == RequestKind::Mutation => {
                    log::warn!("Mutation field `{}` failed: {}", key, e);
                    return GraphResponse {
                        data: None,
                        errors: vec![ErrorItem::new(&e, vec![key])],
                    };
                }
                Err(e) => {
                    log::warn!("Query field `{}` failed: {}", key, e);
                    errors.push(ErrorItem::new(&e, vec![key.clone()]));
                    data.insert(key, Value::Null);
                }
            }
        }
        GraphResponse {
            data: Some(data),
            errors,
        }
    }

    async fn resolve(
        &self,
        field: &RootField,
        claims: Option<&Claims>,
        executor: &dyn Executor,
    ) -> Result<Value, TranslationError> {
        let compiled = self.translate(field, claims)?;
        let request = ExecutionRequest {
            statement: compiled.statement.clone(),
            parameters: compiled.parameters.clone(),
            access_mode: compiled.access_mode,
            query_options: self.config.query_options.clone(),
        };
        let output = executor.run(request).await.map_err(|e| {
            log::warn!("Statement for {} of {} failed: {}", field.operation, field.node_type, e);
            TranslationError::from(e)
        })?;
        compiled.shape.fold(&output)
    }
}
