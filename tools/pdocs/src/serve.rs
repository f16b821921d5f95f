//! Live documentation server.
//!
//! Every page is generated on request from the current sources, so edits show
//! up on the next reload. `HEAD` requests let a page poll whether its module
//! changed since it was rendered.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use pdocs_reflect::{LoadOptions, Reflector};
use tower_http::compression::CompressionLayer;

use crate::config::{HttpAddr, Options, DEFAULT_OUTPUT_DIR};
use crate::render::{brief, file_validator, IndexEntry, Render};
use crate::url::{import_path_from_request, is_dotted_name, EXTERNAL_SUFFIX, MODULE_SUFFIX, PACKAGE_SUFFIX};

/// Shared state of the live server.
pub struct ServerState {
    options: Options,
    reflector: Arc<dyn Reflector>,
    renderer: Arc<dyn Render>,
}

impl ServerState {
    /// Create the server state.
    pub fn new(options: Options, reflector: Arc<dyn Reflector>, renderer: Arc<dyn Render>) -> Self {
        Self {
            options,
            reflector,
            renderer,
        }
    }

    fn output_dir(&self) -> &Path {
        self.options
            .output_dir
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_OUTPUT_DIR))
    }

    fn head(&self, path: &str, headers: &HeaderMap) -> Reply {
        if path == "/" {
            return Reply::empty(StatusCode::OK);
        }
        self.check_modified(path, headers)
    }

    /// Compare the client's validator with the module's modification time.
    ///
    /// A missing `If-None-Match` counts as a match.
    fn check_modified(&self, path: &str, headers: &HeaderMap) -> Reply {
        let import_path = import_path_from_request(path);
        let Some(etag) = self.validator(&import_path) else {
            return Reply::empty(StatusCode::NOT_FOUND);
        };

        let old = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(etag.as_str());
        let status = if old == etag {
            StatusCode::NOT_MODIFIED
        } else {
            StatusCode::RESET_CONTENT
        };

        Reply {
            etag: Some(etag),
            log: status != StatusCode::NOT_MODIFIED,
            ..Reply::empty(status)
        }
    }

    fn validator(&self, import_path: &str) -> Option<String> {
        if !is_dotted_name(import_path) {
            return None;
        }
        let file = self.reflector.resolve(import_path).ok()?.backing_file?;
        file_validator(&file)
    }

    fn get(&self, path: &str) -> Reply {
        if path == "/favicon.ico" {
            return Reply::empty(StatusCode::NO_CONTENT);
        }
        if path == "/" {
            return self.index_page();
        }
        if let Some(name) = path.strip_suffix(EXTERNAL_SUFFIX) {
            return self.external_link(name.trim_start_matches('/'));
        }
        if !path.ends_with('/') && !path.ends_with(MODULE_SUFFIX) {
            return Reply::redirect(format!("{path}/"));
        }
        if let Some(package) = path.strip_suffix(PACKAGE_SUFFIX) {
            return Reply::redirect(format!("{package}/"));
        }
        self.module_page(path)
    }

    fn index_page(&self) -> Reply {
        let mut entries = Vec::with_capacity(self.options.modules.len());
        for target in &self.options.modules {
            // Only the docstring is listed, so submodules are left alone
            let options = LoadOptions::default().shallow(true);
            let unit = match self.reflector.load(target, &options) {
                Ok(unit) => unit,
                Err(e) => return import_error(target, &anyhow::Error::from(e)),
            };
            entries.push(IndexEntry {
                name: unit.name().to_string(),
                brief: brief(unit.module().docstring()),
                href: format!("/{}/", unit.name().replace('.', "/")),
            });
        }
        if !self.options.unsorted {
            entries.sort_by(|a, b| a.name.cmp(&b.name));
        }

        match self.renderer.index_html(&entries) {
            Ok(html) => Reply::html(StatusCode::OK, html),
            Err(e) => {
                tracing::error!("Failed to render the index page: {}", e);
                Reply::html(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("<pre>{}</pre>", tera::escape_html(&e.to_string())),
                )
            }
        }
    }

    fn external_link(&self, import_path: &str) -> Reply {
        if let Some(location) = resolve_ext(self.output_dir(), import_path) {
            return Reply::redirect(location);
        }

        tracing::info!("Generating HTML for {} on the fly...", import_path);
        let top = import_path.split('.').next().unwrap_or(import_path);
        match self.render_live(top) {
            Ok(html) => Reply::html(StatusCode::OK, html),
            Err(e) => {
                tracing::debug!("No documentation for {}: {:#}", import_path, e);
                Reply::html(
                    StatusCode::NOT_FOUND,
                    format!(
                        "External identifier <code>{}</code> not found.",
                        tera::escape_html(import_path)
                    ),
                )
            }
        }
    }

    fn module_page(&self, path: &str) -> Reply {
        let import_path = import_path_from_request(path);
        match self.render_live(&import_path) {
            Ok(html) => Reply::html(StatusCode::OK, html),
            Err(e) => import_error(&import_path, &e),
        }
    }

    fn render_live(&self, import_path: &str) -> Result<String> {
        if !is_dotted_name(import_path) {
            return Err(anyhow!("'{}' is not a module name", import_path));
        }
        let options = LoadOptions::default().skip_errors(self.options.skip_errors);
        let unit = self.reflector.load(import_path, &options)?;
        Ok(self.renderer.module_html(unit.module())?)
    }
}

fn import_error(import_path: &str, error: &anyhow::Error) -> Reply {
    let body = format!(
        "Error importing module <code>{}</code>:\n\n<pre>{}</pre>",
        tera::escape_html(import_path),
        tera::escape_html(&format!("{error:?}"))
    )
    .replace('\n', "<br>");
    Reply::html(StatusCode::NOT_FOUND, body)
}

/// Find previously written output documenting `import_path`.
///
/// Tries the longest dotted prefix first, as a package page and then as a
/// module page, and returns the redirect target anchored at the full name.
pub fn resolve_ext(output_dir: &Path, import_path: &str) -> Option<String> {
    if !is_dotted_name(import_path) {
        return None;
    }
    let parts: Vec<&str> = import_path.split('.').collect();
    (1..=parts.len()).rev().find_map(|len| {
        let rel = parts[..len].join("/");
        [format!("{rel}{PACKAGE_SUFFIX}"), format!("{rel}{MODULE_SUFFIX}")]
            .into_iter()
            .find(|candidate| output_dir.join(candidate).is_file())
            .map(|found| format!("/{found}#{import_path}"))
    })
}

/// A response under construction.
struct Reply {
    status: StatusCode,
    location: Option<String>,
    etag: Option<String>,
    body: Option<String>,
    log: bool,
}

impl Reply {
    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            location: None,
            etag: None,
            body: None,
            log: true,
        }
    }

    fn html(status: StatusCode, body: String) -> Self {
        Self {
            body: Some(body),
            ..Self::empty(status)
        }
    }

    fn redirect(location: String) -> Self {
        Self {
            location: Some(location),
            ..Self::empty(StatusCode::FOUND)
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        if self.body.is_some() {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            );
        }
        if let Some(value) = self.location.and_then(|l| HeaderValue::from_str(&l).ok()) {
            headers.insert(header::LOCATION, value);
        }
        if let Some(value) = self.etag.and_then(|e| HeaderValue::from_str(&e).ok()) {
            headers.insert(header::ETAG, value);
        }
        (self.status, headers, self.body.unwrap_or_default()).into_response()
    }
}

async fn dispatch(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let path = uri.path();
    let reply = if method == Method::HEAD {
        state.head(path, &headers)
    } else if method == Method::GET {
        state.get(path)
    } else {
        Reply::empty(StatusCode::METHOD_NOT_ALLOWED)
    };

    if reply.log {
        tracing::info!("\"{} {}\" {}", method, path, reply.status.as_u16());
    }
    reply.into_response()
}

/// Build the router serving every request from `state`.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Run the live server until interrupted.
pub fn run(options: Options, reflector: Arc<dyn Reflector>, renderer: Arc<dyn Render>) -> Result<()> {
    let addr = options
        .http
        .clone()
        .ok_or_else(|| anyhow!("no address to serve on"))?;
    let state = Arc::new(ServerState::new(options, reflector, renderer));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(run_async(addr, state))
}

async fn run_async(addr: HttpAddr, state: Arc<ServerState>) -> Result<()> {
    let app = router(state);

    tracing::info!("Starting pdocs server on {}", addr);
    let listener = tokio::net::TcpListener::bind((addr.host.as_str(), addr.port)).await?;
    tracing::info!("pdocs server ready at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_http_addr;
    use crate::render::{RenderConfig, Renderer};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pdocs_reflect::SourceReflector;
    use std::fs;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn fixture() -> (TempDir, Router) {
        fixture_with(|_| {})
    }

    fn fixture_with(configure: impl FnOnce(&Path)) -> (TempDir, Router) {
        let tmp = TempDir::new().unwrap();
        let pkg = tmp.path().join("pkg");
        fs::create_dir(&pkg).unwrap();
        fs::write(pkg.join("__init__.py"), "\"\"\"The package.\"\"\"\n").unwrap();
        fs::write(
            pkg.join("mod.py"),
            "\"\"\"A module.\"\"\"\n\ndef answer():\n    \"\"\"Return 42.\"\"\"\n    return 42\n",
        )
        .unwrap();
        configure(&pkg);

        let options = Options {
            modules: vec![pkg.display().to_string()],
            http: Some(parse_http_addr(":").unwrap()),
            output_dir: Some(tmp.path().join("html")),
            ..Options::default()
        }
        .finalize()
        .unwrap();
        let reflector = Arc::new(SourceReflector::new(vec![tmp.path().to_path_buf()]));
        let renderer = Renderer::new(RenderConfig::from_template_config(&options.template_config), None)
            .unwrap();
        let state = ServerState::new(options, reflector, Arc::new(renderer));
        (tmp, router(Arc::new(state)))
    }

    async fn send(app: &Router, method: Method, uri: &str, etag: Option<&str>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(etag) = etag {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        app.clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response) -> &str {
        response.headers()[header::LOCATION].to_str().unwrap()
    }

    #[tokio::test]
    async fn head_reports_modification() {
        let (tmp, app) = fixture();

        let first = send(&app, Method::HEAD, "/pkg/mod.html", None).await;
        assert_eq!(first.status(), StatusCode::NOT_MODIFIED);
        let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

        let again = send(&app, Method::HEAD, "/pkg/mod.html", Some(&etag)).await;
        assert_eq!(again.status(), StatusCode::NOT_MODIFIED);

        let file = fs::File::options()
            .write(true)
            .open(tmp.path().join("pkg/mod.py"))
            .unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();

        let changed = send(&app, Method::HEAD, "/pkg/mod.html", Some(&etag)).await;
        assert_eq!(changed.status(), StatusCode::RESET_CONTENT);
    }

    #[tokio::test]
    async fn head_of_root_and_unknown_modules() {
        let (_tmp, app) = fixture();
        assert_eq!(send(&app, Method::HEAD, "/", None).await.status(), StatusCode::OK);
        assert_eq!(
            send(&app, Method::HEAD, "/nope/", None).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn index_lists_module_arguments() {
        let (_tmp, app) = fixture();
        let response = send(&app, Method::GET, "/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let html = body(response).await;
        assert!(html.contains("href=\"/pkg/\""));
        assert!(html.contains("The package."));
    }

    #[tokio::test]
    async fn index_ignores_broken_submodules() {
        let (_tmp, app) = fixture_with(|pkg| {
            fs::write(pkg.join("broken.py"), "'''never closed\n").unwrap();
        });

        let response = send(&app, Method::GET, "/", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(response).await.contains("The package."));
    }

    #[tokio::test]
    async fn live_pages_poll_their_validator() {
        let (_tmp, app) = fixture();

        let head = send(&app, Method::HEAD, "/pkg/mod.html", None).await;
        let etag = head.headers()[header::ETAG].to_str().unwrap().to_string();

        let html = body(send(&app, Method::GET, "/pkg/mod.html", None).await).await;
        assert!(html.contains("method: \"HEAD\""));
        assert!(html.contains(&format!("\"If-None-Match\": \"{etag}\"")));
        assert!(html.contains("window.location.reload()"));
    }

    #[tokio::test]
    async fn module_pages_render_live() {
        let (tmp, app) = fixture();
        let html = body(send(&app, Method::GET, "/pkg/mod.html", None).await).await;
        assert!(html.contains("Return 42."));

        fs::write(
            tmp.path().join("pkg/mod.py"),
            "def answer():\n    \"\"\"Return 43.\"\"\"\n",
        )
        .unwrap();
        let html = body(send(&app, Method::GET, "/pkg/mod.html", None).await).await;
        assert!(html.contains("Return 43."));
    }

    #[tokio::test]
    async fn canonical_redirects() {
        let (_tmp, app) = fixture();

        let response = send(&app, Method::GET, "/pkg", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/pkg/");

        let response = send(&app, Method::GET, "/pkg/index.html", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/pkg/");
    }

    #[tokio::test]
    async fn favicon_is_empty() {
        let (_tmp, app) = fixture();
        let response = send(&app, Method::GET, "/favicon.ico", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(body(response).await.is_empty());
    }

    #[tokio::test]
    async fn import_errors_are_reported() {
        let (_tmp, app) = fixture();
        let response = send(&app, Method::GET, "/missing/", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body(response)
            .await
            .starts_with("Error importing module <code>missing</code>:<br><br><pre>"));
    }

    #[tokio::test]
    async fn external_links_prefer_written_output() {
        let (tmp, app) = fixture();
        let out = tmp.path().join("html/pkg");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("mod.html"), "<html></html>").unwrap();

        let response = send(&app, Method::GET, "/pkg.mod.answer.ext", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/pkg/mod.html#pkg.mod.answer");
    }

    #[tokio::test]
    async fn external_links_fall_back_to_live_generation() {
        let (_tmp, app) = fixture();

        let response = send(&app, Method::GET, "/pkg.mod.answer.ext", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(response).await.contains("The package."));

        let response = send(&app, Method::GET, "/nothing.here.ext", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body(response).await,
            "External identifier <code>nothing.here</code> not found."
        );
    }

    #[test]
    fn resolve_ext_tries_longest_prefix_first() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("pkg/sub")).unwrap();
        fs::write(tmp.path().join("pkg/index.html"), "").unwrap();
        fs::write(tmp.path().join("pkg/sub/index.html"), "").unwrap();

        assert_eq!(
            resolve_ext(tmp.path(), "pkg.sub.Name").as_deref(),
            Some("/pkg/sub/index.html#pkg.sub.Name")
        );
        assert_eq!(
            resolve_ext(tmp.path(), "pkg.other").as_deref(),
            Some("/pkg/index.html#pkg.other")
        );
        assert_eq!(resolve_ext(tmp.path(), "elsewhere.x"), None);
        assert_eq!(resolve_ext(tmp.path(), "..pkg"), None);
    }
}
