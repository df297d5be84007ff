use std::net::SocketAddr;

use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct HubServer {
    local_addr: SocketAddr,
    cancel: CancellationToken,
}

impl HubServer {
    /// Binds `host:port` and serves `app` until `cancel` fires. Port 0 picks
    /// a free port; [`HubServer::local_addr`] reports the bound one.
    pub async fn start(
        host: &str,
        port: u16,
        app: Router,
        cancel: CancellationToken,
    ) -> AppResult<(Self, JoinHandle<()>)> {
        let addr = format!("{}:{}", host, port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Config(format!("Address {} binding failed: {}", addr, e)))?;
        let local_addr = listener.local_addr()?;
        info!("Hub server started at http://{}", local_addr);

        let server = Self {
            local_addr,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(async move {
            use hyper::body::Incoming;
            use hyper::server::conn::http1;
            use hyper_util::rt::TokioIo;
            use hyper_util::service::TowerToHyperService;
            use tower::ServiceExt;

            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => accepted,
                };
                match accepted {
                    Ok((stream, remote_addr)) => {
                        let io = TokioIo::new(stream);
                        let app_with_info = app.clone().map_request(
                            move |mut req: axum::http::Request<Incoming>| {
                                req.extensions_mut()
                                    .insert(axum::extract::ConnectInfo(remote_addr));
                                req
                            },
                        );
                        let service = TowerToHyperService::new(app_with_info);

                        tokio::task::spawn(async move {
                            if let Err(err) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                debug!("Connection handling ended or failed: {:?}", err);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {:?}", e);
                    }
                }
            }
            info!("Hub server stopped accepting connections");
        });

        Ok((server, handle))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
