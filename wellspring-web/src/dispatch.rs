//! Central request dispatch. The [Dispatcher] owns an ordered list of handler mappings and
//! argument resolvers; every HTTP method, extension methods included, goes through the same
//! entry point.
//!
//! Dispatch binds the request state to the current thread for its whole duration, resolves the
//! handler chain, runs interceptors around the invocation, and publishes a [RequestHandledEvent]
//! through the owning context whether the request succeeded or failed.

use crate::handler::{
    HandlerExecutionChain, HandlerInterceptorPtr, HandlerMapping, ResolvedArg,
};
use crate::request::{BoundRequestState, RequestContextHolder, WebRequest};
use crate::response::WebResponse;
use http::StatusCode;
#[cfg(test)]
use mockall::automock;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, warn};
use wellspring_beans::error::ErrorPtr;
use wellspring_context::context::ApplicationContext;
use wellspring_context::event::ApplicationEvent;

#[derive(Error, Clone, Debug)]
pub enum DispatchError {
    #[error("no handler found for {method} {path}")]
    NoHandlerFound { method: String, path: String },
    #[error("no argument resolver produced a value for parameter '{parameter}' of handler '{handler}'")]
    UnresolvableParameter { handler: String, parameter: String },
    #[error("handler '{handler}' failed: {cause}")]
    HandlerFailure { handler: String, cause: ErrorPtr },
    #[error("interceptor failed during {phase} for handler '{handler}': {cause}")]
    InterceptorFailure {
        handler: String,
        phase: &'static str,
        cause: ErrorPtr,
    },
}

/// Published after every dispatch, successful or not.
#[derive(Debug)]
pub struct RequestHandledEvent {
    pub method: String,
    pub path: String,
    /// Response status; absent when dispatch failed before producing a response.
    pub status: Option<u16>,
    pub duration: Duration,
    pub failure: Option<String>,
}

impl ApplicationEvent for RequestHandledEvent {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Produces the value for one named handler parameter, or `None` when this resolver does not
/// recognize it. Resolvers are consulted in registration order.
#[cfg_attr(test, automock)]
pub trait ArgumentResolver: Send + Sync {
    fn resolve(&self, parameter: &str, request: &WebRequest) -> Option<ResolvedArg>;
}

/// Resolves parameters from request parameters (query values and captured path variables) as
/// `Arc<String>`.
pub struct RequestParamResolver;

impl ArgumentResolver for RequestParamResolver {
    fn resolve(&self, parameter: &str, request: &WebRequest) -> Option<ResolvedArg> {
        request
            .params
            .get(parameter)
            .map(|value| Arc::new(value.clone()) as ResolvedArg)
    }
}

/// Resolves parameters from request attributes, returning whatever was stored under the
/// parameter name.
pub struct RequestAttributeResolver;

impl ArgumentResolver for RequestAttributeResolver {
    fn resolve(&self, parameter: &str, request: &WebRequest) -> Option<ResolvedArg> {
        request.attributes().raw_attribute(parameter)
    }
}

/// Front controller routing requests through mappings, interceptors and argument resolution to
/// handlers.
pub struct Dispatcher {
    context: Arc<ApplicationContext>,
    mappings: Vec<Arc<dyn HandlerMapping>>,
    resolvers: Vec<Arc<dyn ArgumentResolver>>,
}

impl Dispatcher {
    /// Creates a dispatcher publishing its events through the given context, with the default
    /// argument resolvers installed.
    pub fn new(context: Arc<ApplicationContext>) -> Self {
        Self {
            context,
            mappings: vec![],
            resolvers: vec![
                // params first so query values and path variables win over attributes
                Arc::new(RequestParamResolver),
                Arc::new(RequestAttributeResolver),
            ],
        }
    }

    /// Appends a mapping; mappings are consulted in registration order and the first one
    /// returning a chain wins.
    pub fn add_mapping(&mut self, mapping: Arc<dyn HandlerMapping>) {
        self.mappings.push(mapping);
    }

    /// Appends an argument resolver consulted after the existing ones.
    pub fn add_resolver(&mut self, resolver: Arc<dyn ArgumentResolver>) {
        self.resolvers.push(resolver);
    }

    /// Dispatches one request. Request state stays bound to the current thread until the request
    /// completes, the outcome is logged, and a [RequestHandledEvent] is published either way.
    pub fn dispatch(&self, mut request: WebRequest) -> Result<WebResponse, DispatchError> {
        let started = Instant::now();
        let method = request.method.to_string();
        let path = request.path().to_string();

        let result = {
            let _request_binding =
                RequestContextHolder::bind(BoundRequestState::from_request(&request));
            self.do_dispatch(&mut request)
        };

        match &result {
            Ok(response) => {
                debug!("{method} {path} -> {}", response.status);
            }
            Err(failure) => {
                error!("{method} {path} failed: {failure}");
            }
        }

        let event = RequestHandledEvent {
            method,
            path,
            status: result.as_ref().ok().map(|response| response.status.as_u16()),
            duration: started.elapsed(),
            failure: result.as_ref().err().map(ToString::to_string),
        };
        if let Err(publish_error) = self.context.publish_event(&event) {
            warn!("Could not publish request-handled event: {publish_error}");
        }

        result
    }

    fn do_dispatch(&self, request: &mut WebRequest) -> Result<WebResponse, DispatchError> {
        let chain = self
            .mappings
            .iter()
            .find_map(|mapping| mapping.handler(request))
            .ok_or_else(|| DispatchError::NoHandlerFound {
                method: request.method.to_string(),
                path: request.path().to_string(),
            })?;

        for (name, value) in &chain.path_variables {
            request.params.insert(name.clone(), value.clone());
        }

        // after-completion runs for exactly the interceptors whose pre-handle accepted
        let mut accepted = 0;
        let outcome = self.invoke_chain(request, &chain, &mut accepted);

        let failure = outcome.as_ref().err().map(ToString::to_string);
        Self::complete(
            request,
            &chain.interceptors[..accepted],
            &chain.handler.name,
            failure.as_deref(),
        );

        outcome
    }

    fn invoke_chain(
        &self,
        request: &WebRequest,
        chain: &HandlerExecutionChain,
        accepted: &mut usize,
    ) -> Result<WebResponse, DispatchError> {
        let handler_name = &chain.handler.name;

        for interceptor in &chain.interceptors {
            let proceed = interceptor
                .pre_handle(request, handler_name)
                .map_err(|cause| DispatchError::InterceptorFailure {
                    handler: handler_name.clone(),
                    phase: "pre-handle",
                    cause,
                })?;

            if !proceed {
                debug!("Interceptor short-circuited handler '{handler_name}'");
                return Ok(WebResponse::with_status(StatusCode::NO_CONTENT));
            }

            *accepted += 1;
        }

        let args = self.resolve_arguments(request, chain)?;

        let mut response =
            (chain.handler.invoke)(request, &args).map_err(|cause| {
                DispatchError::HandlerFailure {
                    handler: handler_name.clone(),
                    cause,
                }
            })?;

        for interceptor in chain.interceptors.iter().rev() {
            interceptor
                .post_handle(request, &mut response, handler_name)
                .map_err(|cause| DispatchError::InterceptorFailure {
                    handler: handler_name.clone(),
                    phase: "post-handle",
                    cause,
                })?;
        }

        Ok(response)
    }

    fn resolve_arguments(
        &self,
        request: &WebRequest,
        chain: &HandlerExecutionChain,
    ) -> Result<Vec<ResolvedArg>, DispatchError> {
        chain
            .handler
            .parameters
            .iter()
            .map(|parameter| {
                self.resolvers
                    .iter()
                    .find_map(|resolver| resolver.resolve(parameter, request))
                    .ok_or_else(|| DispatchError::UnresolvableParameter {
                        handler: chain.handler.name.clone(),
                        parameter: parameter.clone(),
                    })
            })
            .collect()
    }

    fn complete(
        request: &WebRequest,
        interceptors: &[HandlerInterceptorPtr],
        handler_name: &str,
        failure: Option<&str>,
    ) {
        for interceptor in interceptors.iter().rev() {
            if let Err(completion_error) =
                interceptor.after_completion(request, handler_name, failure)
            {
                warn!("Error in after-completion for handler '{handler_name}': {completion_error}");
            }
        }
    }
}
