//! The HTTP accept loop

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use npmcdn_core::error::{CdnError, CdnResult};

use crate::orchestrator::{Outcome, RequestOrchestrator};
use crate::respond::{method_not_allowed, respond, ResponseBody};

/// A bound listener plus the pipeline it feeds
pub struct Server {
    listener: TcpListener,
    orchestrator: Arc<RequestOrchestrator>,
}

impl Server {
    pub async fn bind(addr: SocketAddr, orchestrator: RequestOrchestrator) -> CdnResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CdnError::io(format!("Failed to bind {}", addr), e))?;

        Ok(Self {
            listener,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn local_addr(&self) -> CdnResult<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| CdnError::io("Failed to read listener address".to_string(), e))
    }

    /// Accept connections until `shutdown` completes. Each connection is
    /// served on its own task.
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> CdnResult<()> {
        tokio::pin!(shutdown);

        loop {
            let (stream, remote) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutting down");
                    return Ok(());
                }
            };

            let orchestrator = Arc::clone(&self.orchestrator);
            tokio::spawn(async move {
                let service = service_fn(move |request| {
                    let orchestrator = Arc::clone(&orchestrator);
                    async move { Ok::<_, Infallible>(handle_request(&orchestrator, request).await) }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!("Connection from {} ended with error: {}", remote, e);
                }
            });
        }
    }
}

/// Answer one HTTP request
pub async fn handle_request(
    orchestrator: &RequestOrchestrator,
    request: Request<Incoming>,
) -> Response<ResponseBody> {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request
        .uri()
        .path_and_query()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let response = if method == Method::GET || method == Method::HEAD {
        let outcome = orchestrator.handle(&url).await;
        if let Outcome::Error(error) = &outcome {
            if error.is_server_error() {
                warn!("{} {} failed: {}", method, url, error);
            }
        }
        respond(outcome).await
    } else {
        method_not_allowed()
    };

    info!(
        "{} {} {} {}ms",
        method,
        url,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );

    response
}
