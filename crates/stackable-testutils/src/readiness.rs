//! HTTP probe of an operator's readiness endpoint.
use http::{
    Request, StatusCode, Uri,
    header::HOST,
    uri::{InvalidUri, PathAndQuery},
};
use hyper_util::rt::TokioIo;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tokio::net::TcpStream;
use tracing::instrument;

/// The readiness endpoint operators serve next to their health checks.
pub const DEFAULT_READINESS_URL: &str = "http://localhost:8081/readyz";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to parse {url:?} as URL"))]
    ParseUrl { source: InvalidUri, url: String },

    #[snafu(display("unsupported scheme in {url:?}, only plain http is supported"))]
    UnsupportedScheme { url: String },

    #[snafu(display("URL {url:?} has no host"))]
    MissingHost { url: String },

    #[snafu(display("failed to connect to {address}"))]
    Connect {
        source: std::io::Error,
        address: String,
    },

    #[snafu(display("HTTP handshake with {address} failed"))]
    Handshake {
        source: hyper::Error,
        address: String,
    },

    #[snafu(display("failed to build readiness request"))]
    BuildRequest { source: http::Error },

    #[snafu(display("failed to send readiness request"))]
    SendRequest { source: hyper::Error },
}

/// Sends a GET request to [`DEFAULT_READINESS_URL`] and returns the status
/// code of the response.
pub async fn probe_readiness() -> Result<StatusCode, Error> {
    probe_readiness_at(DEFAULT_READINESS_URL).await
}

/// Sends a GET request to `url` and returns the status code of the response.
///
/// Any response, including error codes, is a successful probe. Only transport
/// failures are errors.
#[instrument]
pub async fn probe_readiness_at(url: &str) -> Result<StatusCode, Error> {
    let uri: Uri = url.parse().context(ParseUrlSnafu { url })?;
    ensure!(
        uri.scheme_str().is_none_or(|scheme| scheme == "http"),
        UnsupportedSchemeSnafu { url }
    );

    let authority = uri.authority().context(MissingHostSnafu { url })?;
    let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

    let stream = TcpStream::connect(address.as_str())
        .await
        .context(ConnectSnafu { address: &address })?;
    let (mut sender, connection) =
        hyper::client::conn::http1::handshake::<_, String>(TokioIo::new(stream))
            .await
            .context(HandshakeSnafu { address: &address })?;

    tokio::spawn(async move {
        if let Err(err) = connection.await {
            tracing::debug!(error = &err as &dyn std::error::Error, "readiness connection closed");
        }
    });

    let path = uri.path_and_query().map_or("/", PathAndQuery::as_str);
    let request = Request::get(path)
        .header(HOST, authority.as_str())
        .body(String::new())
        .context(BuildRequestSnafu)?;

    let response = sender.send_request(request).await.context(SendRequestSnafu)?;
    tracing::debug!(status = %response.status(), "received readiness response");

    Ok(response.status())
}

#[cfg(test)]
mod tests {
    use axum::{Router, routing::get};
    use tokio::net::TcpListener;

    use super::*;

    async fn serve() -> String {
        let router = Router::new()
            .route("/readyz", get(|| async { StatusCode::OK }))
            .route("/livez", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await });

        format!("http://{address}")
    }

    #[tokio::test]
    async fn returns_status_code() {
        let base = serve().await;

        let ready = probe_readiness_at(&format!("{base}/readyz")).await.unwrap();
        assert_eq!(ready, StatusCode::OK);

        let unavailable = probe_readiness_at(&format!("{base}/livez")).await.unwrap();
        assert_eq!(unavailable, StatusCode::SERVICE_UNAVAILABLE);

        let missing = probe_readiness_at(&format!("{base}/missing")).await.unwrap();
        assert_eq!(missing, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn connection_refused_is_an_error() {
        // Bind and drop a listener to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let error = probe_readiness_at(&format!("http://{address}/readyz"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::Connect { .. }));
    }

    #[tokio::test]
    async fn https_is_rejected() {
        let error = probe_readiness_at("https://localhost:8081/readyz")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::UnsupportedScheme { .. }));
    }
}
