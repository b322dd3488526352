use http::{Method, StatusCode, Uri};
use std::sync::{Arc, Mutex};
use wellspring_beans::definition::BeanDefinition;
use wellspring_beans::error::ErrorPtr;
use wellspring_context::context::ApplicationContext;
use wellspring_context::event::{ApplicationEvent, ApplicationListener};
use wellspring_web::bootstrap::{
    ContextLoader, DeploymentUnit, DispatcherBootstrap, WebBootstrapError,
    BOOTSTRAP_ERROR_ATTRIBUTE, NAMESPACE_PARAM,
};
use wellspring_web::config::DispatcherConfig;
use wellspring_web::dispatch::{DispatchError, RequestHandledEvent};
use wellspring_web::handler::{Handler, HandlerInterceptor};
use wellspring_web::{Dispatcher, PathPatternHandlerMapping, WebRequest, WebResponse};

fn active_context() -> Arc<ApplicationContext> {
    let context = Arc::new(
        ApplicationContext::builder()
            .with_id("web-test")
            .build()
            .unwrap(),
    );
    context.refresh().unwrap();
    context
}

fn request(method: Method, uri: &str) -> WebRequest {
    WebRequest::new(method, uri.parse::<Uri>().unwrap())
}

fn test_error(message: &str) -> ErrorPtr {
    Arc::new(std::io::Error::new(std::io::ErrorKind::Other, message.to_string()))
}

struct RecordingInterceptor {
    label: &'static str,
    accept: bool,
    log: Arc<Mutex<Vec<String>>>,
}

impl HandlerInterceptor for RecordingInterceptor {
    fn pre_handle(&self, _request: &WebRequest, _handler_name: &str) -> Result<bool, ErrorPtr> {
        self.log.lock().unwrap().push(format!("{}:pre", self.label));
        Ok(self.accept)
    }

    fn post_handle(
        &self,
        _request: &WebRequest,
        _response: &mut WebResponse,
        _handler_name: &str,
    ) -> Result<(), ErrorPtr> {
        self.log.lock().unwrap().push(format!("{}:post", self.label));
        Ok(())
    }

    fn after_completion(
        &self,
        _request: &WebRequest,
        _handler_name: &str,
        failure: Option<&str>,
    ) -> Result<(), ErrorPtr> {
        self.log.lock().unwrap().push(format!(
            "{}:completion:{}",
            self.label,
            if failure.is_some() { "failed" } else { "ok" }
        ));
        Ok(())
    }
}

#[derive(Default)]
struct RequestEventListener {
    events: Mutex<Vec<(String, Option<u16>, Option<String>)>>,
}

impl ApplicationListener for RequestEventListener {
    fn on_event(&self, event: &dyn ApplicationEvent) -> Result<(), ErrorPtr> {
        if let Some(handled) = event.as_any().downcast_ref::<RequestHandledEvent>() {
            self.events.lock().unwrap().push((
                format!("{} {}", handled.method, handled.path),
                handled.status,
                handled.failure.clone(),
            ));
        }
        Ok(())
    }
}

#[test]
fn should_dispatch_to_most_specific_handler_with_path_variables() {
    let mut mapping = PathPatternHandlerMapping::default();
    mapping
        .register(
            Method::GET,
            "/**",
            Handler::new("catch-all", Vec::<String>::new(), |_, _| {
                Ok(WebResponse::ok("catch-all"))
            }),
        )
        .unwrap();
    mapping
        .register(
            Method::GET,
            "/orders/{id}",
            Handler::new("order-by-id", ["id"], |_, args| {
                let id = args[0].clone().downcast::<String>().map_err(|_| {
                    test_error("expected a string argument")
                })?;
                Ok(WebResponse::ok(format!("order {id}")))
            }),
        )
        .unwrap();

    let mut dispatcher = Dispatcher::new(active_context());
    dispatcher.add_mapping(Arc::new(mapping));

    let response = dispatcher
        .dispatch(request(Method::GET, "/orders/42"))
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "order 42");

    let response = dispatcher
        .dispatch(request(Method::GET, "/anything/else"))
        .unwrap();
    assert_eq!(response.body, "catch-all");
}

#[test]
fn should_short_circuit_without_invoking_handler_when_interceptor_rejects() {
    let log = Arc::new(Mutex::new(vec![]));
    let invoked = Arc::new(Mutex::new(false));

    let mut mapping = PathPatternHandlerMapping::default();
    let handler_invoked = invoked.clone();
    mapping
        .register(
            Method::GET,
            "/orders",
            Handler::new("orders", Vec::<String>::new(), move |_, _| {
                *handler_invoked.lock().unwrap() = true;
                Ok(WebResponse::ok("orders"))
            }),
        )
        .unwrap();
    mapping.add_interceptor(Arc::new(RecordingInterceptor {
        label: "first",
        accept: true,
        log: log.clone(),
    }));
    mapping.add_interceptor(Arc::new(RecordingInterceptor {
        label: "second",
        accept: false,
        log: log.clone(),
    }));

    let mut dispatcher = Dispatcher::new(active_context());
    dispatcher.add_mapping(Arc::new(mapping));

    let response = dispatcher.dispatch(request(Method::GET, "/orders")).unwrap();

    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(!*invoked.lock().unwrap());

    // after-completion only for the interceptor which accepted, no post-handle at all
    assert_eq!(
        *log.lock().unwrap(),
        ["first:pre", "second:pre", "first:completion:ok"]
    );
}

#[test]
fn should_run_after_completion_with_failure_when_handler_fails() {
    let log = Arc::new(Mutex::new(vec![]));

    let mut mapping = PathPatternHandlerMapping::default();
    mapping
        .register(
            Method::GET,
            "/orders",
            Handler::new("orders", Vec::<String>::new(), |_, _| {
                Err(test_error("database down"))
            }),
        )
        .unwrap();
    mapping.add_interceptor(Arc::new(RecordingInterceptor {
        label: "audit",
        accept: true,
        log: log.clone(),
    }));

    let mut dispatcher = Dispatcher::new(active_context());
    dispatcher.add_mapping(Arc::new(mapping));

    let error = dispatcher
        .dispatch(request(Method::GET, "/orders"))
        .unwrap_err();
    assert!(matches!(error, DispatchError::HandlerFailure { .. }));
    assert_eq!(*log.lock().unwrap(), ["audit:pre", "audit:completion:failed"]);
}

#[test]
fn should_name_handler_and_parameter_when_no_resolver_matches() {
    let mut mapping = PathPatternHandlerMapping::default();
    mapping
        .register(
            Method::GET,
            "/orders",
            Handler::new("orders", ["missing"], |_, _| Ok(WebResponse::ok(""))),
        )
        .unwrap();

    let mut dispatcher = Dispatcher::new(active_context());
    dispatcher.add_mapping(Arc::new(mapping));

    let error = dispatcher
        .dispatch(request(Method::GET, "/orders"))
        .unwrap_err();
    assert!(matches!(
        error,
        DispatchError::UnresolvableParameter { handler, parameter }
            if handler == "orders" && parameter == "missing"
    ));
}

#[test]
fn should_resolve_arguments_from_request_attributes() {
    let mut mapping = PathPatternHandlerMapping::default();
    mapping
        .register(
            Method::GET,
            "/profile",
            Handler::new("profile", ["user"], |_, args| {
                let user = args[0]
                    .clone()
                    .downcast::<String>()
                    .map_err(|_| test_error("expected a string argument"))?;
                Ok(WebResponse::ok(format!("hello {user}")))
            }),
        )
        .unwrap();

    // attribute resolution works out of the box, without registering extra resolvers
    let mut dispatcher = Dispatcher::new(active_context());
    dispatcher.add_mapping(Arc::new(mapping));

    let request = request(Method::GET, "/profile");
    request
        .attributes()
        .set_attribute("user", Arc::new("alice".to_string()));

    let response = dispatcher.dispatch(request).unwrap();
    assert_eq!(response.body, "hello alice");
}

#[test]
fn should_publish_request_handled_event_for_success_and_failure() {
    let listener = Arc::new(RequestEventListener::default());
    let context = active_context();
    context.add_listener(listener.clone());

    let mut mapping = PathPatternHandlerMapping::default();
    mapping
        .register(
            Method::GET,
            "/ok",
            Handler::new("ok", Vec::<String>::new(), |_, _| Ok(WebResponse::ok("ok"))),
        )
        .unwrap();

    let mut dispatcher = Dispatcher::new(context);
    dispatcher.add_mapping(Arc::new(mapping));

    dispatcher.dispatch(request(Method::GET, "/ok")).unwrap();
    dispatcher
        .dispatch(request(Method::GET, "/missing"))
        .unwrap_err();

    let events = listener.events.lock().unwrap();
    assert_eq!(events.len(), 2);

    assert_eq!(events[0].0, "GET /ok");
    assert_eq!(events[0].1, Some(200));
    assert!(events[0].2.is_none());

    assert_eq!(events[1].0, "GET /missing");
    assert!(events[1].1.is_none());
    assert!(events[1].2.as_deref().unwrap().contains("/missing"));
}

#[test]
fn should_route_extension_methods_through_dispatch() {
    let purge = Method::from_bytes(b"PURGE").unwrap();

    let mut mapping = PathPatternHandlerMapping::default();
    mapping
        .register(
            purge.clone(),
            "/cache/{key}",
            Handler::new("purge-cache", ["key"], |_, args| {
                let key = args[0]
                    .clone()
                    .downcast::<String>()
                    .map_err(|_| test_error("expected a string argument"))?;
                Ok(WebResponse::ok(format!("purged {key}")))
            }),
        )
        .unwrap();

    let mut dispatcher = Dispatcher::new(active_context());
    dispatcher.add_mapping(Arc::new(mapping));

    let response = dispatcher
        .dispatch(request(purge, "/cache/sessions"))
        .unwrap();
    assert_eq!(response.body, "purged sessions");

    let error = dispatcher
        .dispatch(request(Method::GET, "/cache/sessions"))
        .unwrap_err();
    assert!(matches!(error, DispatchError::NoHandlerFound { .. }));
}

#[test]
fn should_initialize_root_context_only_once() {
    let unit = DeploymentUnit::new("shop");
    let loader = ContextLoader::default();

    let root = loader.initialize(&unit).unwrap();
    assert_eq!(root.id(), "shop-root");

    let error = loader.initialize(&unit).unwrap_err();
    assert!(matches!(error, WebBootstrapError::IllegalState(_)));

    // the failure is recorded without losing the stored root context
    assert!(unit
        .attribute::<WebBootstrapError>(BOOTSTRAP_ERROR_ATTRIBUTE)
        .is_some());
    assert!(ContextLoader::root_context(&unit).is_some());

    loader.close(&unit);
}

#[test]
fn should_parent_dispatcher_context_to_root() {
    let unit = DeploymentUnit::new("shop");
    let loader = ContextLoader::default().with_context_factory(Arc::new(|unit| {
        ApplicationContext::builder()
            .with_id(format!("{}-root", unit.name()))
            .with_definition(
                "greeting",
                BeanDefinition::builder::<String>()
                    .supplier(|_| Ok("hello from root".to_string()))
                    .build(),
            )
            .build()
    }));
    loader.initialize(&unit).unwrap();

    let bootstrap = DispatcherBootstrap::new("api");
    let child = bootstrap.initialize(&unit).unwrap();

    assert_eq!(child.id(), "api-servlet");
    assert_eq!(
        *child.bean_typed::<String>("greeting").unwrap(),
        "hello from root"
    );

    let error = bootstrap.initialize(&unit).unwrap_err();
    assert!(matches!(error, WebBootstrapError::IllegalState(_)));

    bootstrap.close(&unit);
    assert!(child.bean_typed::<String>("greeting").is_err());
    loader.close(&unit);
}

#[test]
fn should_derive_namespace_from_config_then_unit_then_name() {
    let plain = DeploymentUnit::new("shop");
    let with_param = DeploymentUnit::new("shop").with_init_param(NAMESPACE_PARAM, "from-unit");

    let bootstrap = DispatcherBootstrap::new("api");
    assert_eq!(bootstrap.namespace(&plain), "api-servlet");
    assert_eq!(bootstrap.namespace(&with_param), "from-unit");

    let mut config = DispatcherConfig::default();
    config.namespace = Some("from-config".to_string());
    let configured = DispatcherBootstrap::new("api").with_config(config);
    assert_eq!(configured.namespace(&with_param), "from-config");
}
