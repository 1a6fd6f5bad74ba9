use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use rocket::{
    fairing::{Fairing, Info, Kind},
    http::{Header, StatusClass},
    request::{FromRequest, Outcome},
    Data, Orbit, Request, Response, Rocket,
};

/// Response header echoing the request's ID, so clients can quote it.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Requests slower than this are logged as warnings.
const SLOW_REQUEST: Duration = Duration::from_millis(1000);

/// A unique identifier for a particular request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct RequestId(pub usize);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RequestId {
    /// Atomically get the next ID, wrapping on overflow.
    pub fn next() -> RequestId {
        static REQUEST_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
        RequestId(REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-request bookkeeping, cached on the request when it arrives.
#[derive(Debug)]
struct RequestTrace {
    id: RequestId,
    received: Instant,
}

impl RequestTrace {
    fn start() -> Self {
        Self {
            id: RequestId::next(),
            received: Instant::now(),
        }
    }

    fn of<'r>(req: &'r Request<'_>) -> &'r Self {
        req.local_cache(Self::start)
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for &'r RequestId {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        Outcome::Success(&RequestTrace::of(req).id)
    }
}

/// The log line for a finished request.
fn response_line(id: RequestId, code: impl Display, route: &str, elapsed: Duration) -> String {
    format!("<-rsp{id} {code} {route} in {}ms", elapsed.as_millis())
}

/// Logs every request and its response with how long it took, tagged with
/// the request's ID. Slow successes are warnings.
#[derive(Debug, Copy, Clone)]
pub struct LoggerFairing;

#[rocket::async_trait]
impl Fairing for LoggerFairing {
    fn info(&self) -> Info {
        Info {
            name: "Logger",
            kind: Kind::Liftoff | Kind::Request | Kind::Response | Kind::Shutdown,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let protocol = if rocket.config().tls_enabled() {
            "https"
        } else {
            "http"
        };
        let ip = &rocket.config().address;
        let port = &rocket.config().port;
        info!("Election server launched on {protocol}://{ip}:{port}");
    }

    async fn on_request(&self, req: &mut Request<'_>, _data: &mut Data<'_>) {
        let trace = RequestTrace::of(req);
        info!("->req{} {} {}", trace.id, req.method(), req.uri());
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let trace = RequestTrace::of(req);
        res.set_header(Header::new(REQUEST_ID_HEADER, trace.id.to_string()));

        let code = res.status();
        let route = match req.route() {
            Some(r) => match r.name {
                Some(ref name) => format!("{name} ({})", r.uri),
                None => r.uri.to_string(),
            },
            None => "UNKNOWN ROUTE".to_string(),
        };
        let elapsed = trace.received.elapsed();
        let line = response_line(trace.id, code, &route, elapsed);
        match code.class() {
            StatusClass::ServerError => error!("{line}"),
            StatusClass::ClientError => warn!("{line}"),
            _ if elapsed >= SLOW_REQUEST => warn!("{line} (slow)"),
            _ => info!("{line}"),
        }
    }

    async fn on_shutdown(&self, _rocket: &Rocket<Orbit>) {
        warn!("Shutdown requested, pending election closers will be rescheduled on restart");
    }
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};

    use super::*;

    #[test]
    fn ids_increase() {
        let first = RequestId::next();
        let second = RequestId::next();
        assert!(second > first);
    }

    #[test]
    fn response_lines_carry_their_latency() {
        let line = response_line(
            RequestId(7),
            Status::Conflict,
            "cast_vote (/voter/elections/<election_id>/votes)",
            Duration::from_micros(12_400),
        );
        assert_eq!(
            line,
            "<-rsp7 409 Conflict cast_vote (/voter/elections/<election_id>/votes) in 12ms"
        );
    }

    #[backend_test]
    async fn responses_carry_their_request_id(client: Client) {
        let first = client.get("/elections").dispatch().await;
        let second = client.get("/elections").dispatch().await;

        let id = |header: Option<&str>| header.unwrap().parse::<usize>().unwrap();
        let first_id = id(first.headers().get_one(REQUEST_ID_HEADER));
        let second_id = id(second.headers().get_one(REQUEST_ID_HEADER));
        assert!(second_id > first_id);
    }

    #[backend_test]
    async fn unmatched_requests_still_get_an_id(client: Client) {
        let response = client.get("/no/such/route").dispatch().await;
        assert_eq!(Status::NotFound, response.status());
        assert!(response.headers().get_one(REQUEST_ID_HEADER).is_some());
    }
}
