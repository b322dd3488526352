//! Handler registration and lookup. A [HandlerMapping] turns a request into a
//! [HandlerExecutionChain]: the handler plus the interceptors wrapping it and the path variables
//! captured by the matched pattern.
//!
//! [PathPatternHandlerMapping] matches URL paths segment-wise against patterns built from
//! literals, `{var}` captures, `*` (one segment) and `**` (any number of segments). When several
//! patterns match a path, the most specific one wins: fewer multi-segment wildcards, then fewer
//! single-segment wildcards, then fewer captures, then more literal segments, then registration
//! order.

use crate::request::WebRequest;
use fxhash::FxHashMap;
use http::Method;
#[cfg(test)]
use mockall::automock;
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;
use wellspring_beans::error::ErrorPtr;

use crate::response::WebResponse;

#[derive(Error, Clone, Eq, PartialEq, Debug)]
pub enum PatternError {
    #[error("handler path pattern must start with '/': {0}")]
    MissingLeadingSlash(String),
    #[error("empty segment in path pattern: {0}")]
    EmptySegment(String),
    #[error("malformed capture segment '{segment}' in pattern: {pattern}")]
    MalformedCapture { pattern: String, segment: String },
}

/// A resolved handler argument, produced by an
/// [ArgumentResolver](crate::dispatch::ArgumentResolver).
pub type ResolvedArg = Arc<dyn Any + Send + Sync>;

pub type HandlerInvoker =
    Arc<dyn Fn(&WebRequest, &[ResolvedArg]) -> Result<WebResponse, ErrorPtr> + Send + Sync>;

/// An invocable request handler: a name for diagnostics, the parameters it wants resolved, and
/// the invocation closure receiving them in declaration order.
#[derive(Clone)]
pub struct Handler {
    pub name: String,
    pub parameters: Vec<String>,
    pub invoke: HandlerInvoker,
}

impl Handler {
    pub fn new<S, P, I, F>(name: S, parameters: I, invoke: F) -> Self
    where
        S: Into<String>,
        P: Into<String>,
        I: IntoIterator<Item = P>,
        F: Fn(&WebRequest, &[ResolvedArg]) -> Result<WebResponse, ErrorPtr>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            parameters: parameters.into_iter().map(Into::into).collect(),
            invoke: Arc::new(invoke),
        }
    }
}

pub type HandlerInterceptorPtr = Arc<dyn HandlerInterceptor + Send + Sync>;

/// Hooks wrapping handler invocation. `pre_handle` returning `false` short-circuits the dispatch
/// without invoking the handler; `after_completion` runs for every interceptor whose `pre_handle`
/// accepted the request, regardless of how the dispatch ended.
#[cfg_attr(test, automock)]
pub trait HandlerInterceptor: Send + Sync {
    fn pre_handle(&self, request: &WebRequest, handler_name: &str) -> Result<bool, ErrorPtr> {
        let _ = (request, handler_name);
        Ok(true)
    }

    fn post_handle(
        &self,
        request: &WebRequest,
        response: &mut WebResponse,
        handler_name: &str,
    ) -> Result<(), ErrorPtr> {
        let _ = (request, response, handler_name);
        Ok(())
    }

    fn after_completion<'a>(
        &self,
        request: &WebRequest,
        handler_name: &str,
        failure: Option<&'a str>,
    ) -> Result<(), ErrorPtr> {
        let _ = (request, handler_name, failure);
        Ok(())
    }
}

/// The outcome of handler lookup: what to invoke and how it is wrapped.
#[derive(Clone)]
pub struct HandlerExecutionChain {
    pub handler: Handler,
    pub interceptors: Vec<HandlerInterceptorPtr>,
    pub path_variables: FxHashMap<String, String>,
}

/// Maps requests to handler execution chains.
#[cfg_attr(test, automock)]
pub trait HandlerMapping: Send + Sync {
    fn handler(&self, request: &WebRequest) -> Option<HandlerExecutionChain>;
}

#[derive(Clone, Eq, PartialEq, Debug)]
enum Segment {
    Literal(String),
    Capture(String),
    Wildcard,
    DeepWildcard,
}

#[derive(Clone, Debug)]
struct PathPattern {
    source: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    fn parse(pattern: &str) -> Result<Self, PatternError> {
        let Some(rest) = pattern.strip_prefix('/') else {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        };

        let mut segments = vec![];
        if !rest.is_empty() {
            for segment in rest.split('/') {
                if segment.is_empty() {
                    return Err(PatternError::EmptySegment(pattern.to_string()));
                }

                segments.push(match segment {
                    "*" => Segment::Wildcard,
                    "**" => Segment::DeepWildcard,
                    _ if segment.starts_with('{') || segment.ends_with('}') => {
                        let name = segment
                            .strip_prefix('{')
                            .and_then(|segment| segment.strip_suffix('}'))
                            .filter(|name| !name.is_empty())
                            .ok_or_else(|| PatternError::MalformedCapture {
                                pattern: pattern.to_string(),
                                segment: segment.to_string(),
                            })?;
                        Segment::Capture(name.to_string())
                    }
                    _ => Segment::Literal(segment.to_string()),
                });
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    fn matches(&self, path: &str) -> Option<FxHashMap<String, String>> {
        let path: Vec<&str> = path
            .strip_prefix('/')
            .map(|rest| rest.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let mut captures = FxHashMap::default();
        Self::match_segments(&self.segments, &path, &mut captures).then_some(captures)
    }

    fn match_segments(
        pattern: &[Segment],
        path: &[&str],
        captures: &mut FxHashMap<String, String>,
    ) -> bool {
        match pattern.split_first() {
            None => path.is_empty(),
            Some((Segment::DeepWildcard, rest)) => {
                // greedy from the shortest tail: try consuming 0..=all remaining segments
                (0..=path.len())
                    .any(|skip| Self::match_segments(rest, &path[skip..], captures))
            }
            Some((segment, rest)) => {
                let Some((&head, tail)) = path.split_first() else {
                    return false;
                };

                match segment {
                    Segment::Literal(literal) => {
                        literal == head && Self::match_segments(rest, tail, captures)
                    }
                    Segment::Capture(name) => {
                        if Self::match_segments(rest, tail, captures) {
                            captures.insert(name.clone(), head.to_string());
                            true
                        } else {
                            false
                        }
                    }
                    Segment::Wildcard => Self::match_segments(rest, tail, captures),
                    Segment::DeepWildcard => false,
                }
            }
        }
    }

    /// Lower keys are more specific and win overlapping matches.
    fn specificity(&self) -> (usize, usize, usize, isize) {
        let count = |matcher: fn(&Segment) -> bool| {
            self.segments.iter().filter(|segment| matcher(segment)).count()
        };

        (
            count(|segment| matches!(segment, Segment::DeepWildcard)),
            count(|segment| matches!(segment, Segment::Wildcard)),
            count(|segment| matches!(segment, Segment::Capture(_))),
            -(count(|segment| matches!(segment, Segment::Literal(_))) as isize),
        )
    }
}

struct MappingEntry {
    method: Method,
    pattern: PathPattern,
    handler: Handler,
    registration_index: usize,
}

/// Pattern-based handler registry. Interceptors added to the mapping wrap every handler it
/// returns, in registration order.
#[derive(Default)]
pub struct PathPatternHandlerMapping {
    entries: Vec<MappingEntry>,
    interceptors: Vec<HandlerInterceptorPtr>,
}

impl PathPatternHandlerMapping {
    /// Registers a handler for a method and path pattern. Entries are kept ordered by pattern
    /// specificity so lookup returns the most specific match.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), PatternError> {
        let pattern = PathPattern::parse(pattern)?;
        self.entries.push(MappingEntry {
            method,
            pattern,
            handler,
            registration_index: self.entries.len(),
        });
        self.entries.sort_by_key(|entry| {
            (entry.pattern.specificity(), entry.registration_index)
        });
        Ok(())
    }

    pub fn add_interceptor(&mut self, interceptor: HandlerInterceptorPtr) {
        self.interceptors.push(interceptor);
    }
}

impl HandlerMapping for PathPatternHandlerMapping {
    fn handler(&self, request: &WebRequest) -> Option<HandlerExecutionChain> {
        self.entries
            .iter()
            .filter(|entry| entry.method == request.method)
            .find_map(|entry| {
                entry
                    .pattern
                    .matches(request.path())
                    .map(|path_variables| HandlerExecutionChain {
                        handler: entry.handler.clone(),
                        interceptors: self.interceptors.clone(),
                        path_variables,
                    })
            })
    }
}
