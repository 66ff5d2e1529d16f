use std::io;
use std::sync::{Arc, Mutex};

use switchyard::transform::{BoxedRawHandler, RawFuture, RawHandler};
use switchyard::{
    Method, Payload, RawRequest, Request, ResponseWriter, Route, RouteOptions, StatusCode,
    Transport, WriteResponse,
};

fn get(uri: &str) -> RawRequest {
    RawRequest::from_http(http::Request::get(uri).body(bytes::Bytes::new()).unwrap())
}

/// Writes a body first and only then decides there is no content.
struct ChangedMyMind;

impl WriteResponse for ChangedMyMind {
    fn write_to(&self, w: &mut dyn ResponseWriter) -> io::Result<()> {
        w.write(b"draft body")?;
        w.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }
}

#[tokio::test]
async fn late_no_content_drops_buffered_body() {
    let pipeline = Route::get("/", |_req: Request| async { Payload::custom(ChangedMyMind) })
        .build(&RouteOptions::new());

    let mut t = Transport::new();
    pipeline.serve(&mut t, get("/")).await;

    assert_eq!(t.status(), Some(StatusCode::NO_CONTENT));
    assert!(t.body().is_empty());
    assert_eq!(t.into_response().status(), StatusCode::NO_CONTENT);
}

/// Records the status the writer holds once the inner pipeline returns.
struct SeenStatus {
    next: BoxedRawHandler,
    seen: Arc<Mutex<Option<StatusCode>>>,
}

impl RawHandler for SeenStatus {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: RawRequest) -> RawFuture<'a> {
        Box::pin(async move {
            self.next.serve(&mut *w, req).await;
            *self.seen.lock().unwrap() = w.status();
        })
    }
}

#[tokio::test]
async fn user_transforms_see_the_committed_status() {
    let seen = Arc::new(Mutex::new(None));
    let recorder = {
        let seen = Arc::clone(&seen);
        move |next: BoxedRawHandler| -> BoxedRawHandler {
            Arc::new(SeenStatus { next, seen: Arc::clone(&seen) })
        }
    };

    let pipeline = Route::new(Method::DELETE, "/things/{id}", |_req: Request| async {})
        .with(RouteOptions::new().transform(recorder))
        .build(&RouteOptions::new());

    pipeline.serve(&mut Transport::new(), get("/things/1")).await;
    assert_eq!(*seen.lock().unwrap(), Some(StatusCode::NO_CONTENT));
    assert_eq!(pipeline.method(), Method::DELETE);
    assert_eq!(pipeline.path(), "/things/{id}");
}

#[tokio::test]
async fn route_options_override_defaults() {
    let defaults = RouteOptions::new().error_handler(
        |w: &mut dyn ResponseWriter, _err: &switchyard::Error| -> io::Result<()> {
            w.set_status(StatusCode::SERVICE_UNAVAILABLE);
            Ok(())
        },
    );
    let route = Route::get("/", |_req: Request| async {
        Err::<(), _>(switchyard::Error::other("nope"))
    })
    .with(RouteOptions::new().error_handler(switchyard::PlainErrorHandler));

    let mut t = Transport::new();
    route.build(&defaults).serve(&mut t, get("/")).await;

    assert_eq!(t.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(t.body(), b"nope");
}
