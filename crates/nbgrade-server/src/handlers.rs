//! The upload and report handlers.

use crate::{auth, error::ServerError, templates, AppState};
use anyhow::Context;
use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::PrivateCookieJar;
use nbgrade_util::file_util;
use serde_json::Value;
use std::time::Instant;

/// Uploads larger than this are rejected without writing a submission file.
pub(crate) const MAX_UPLOAD_SIZE: usize = 1 << 20;

pub(crate) const REPORT_URL_HEADER: &str = "X-Report-Url";

pub(crate) async fn upload_form(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
) -> Result<Html<&'static str>, ServerError> {
    if state.inner.opts.use_openid {
        auth::authenticate(&jar)?;
    }
    Ok(Html(templates::UPLOAD_FORM_HTML))
}

pub(crate) async fn favicon() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "image/x-icon")],
        templates::FAVICON,
    )
}

fn cors_headers(state: &AppState, request_headers: &HeaderMap, preflight: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if !state.inner.opts.allow_cors {
        return headers;
    }
    let origin = request_headers
        .get(header::ORIGIN)
        .cloned()
        .unwrap_or(HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("1800"),
    );
    // the response header carrying the report link must be readable
    // cross-origin
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(REPORT_URL_HEADER),
    );
    if preflight {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("POST"),
        );
    }
    headers
}

pub(crate) async fn handle_upload_options(
    State(state): State<AppState>,
    request_headers: HeaderMap,
) -> Response {
    cors_headers(&state, &request_headers, true).into_response()
}

pub(crate) async fn handle_upload(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    request_headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let opts = &state.inner.opts;
    let mut headers = cors_headers(&state, &request_headers, false);

    let user_hash = if opts.use_openid {
        auth::authenticate(&jar)?
    } else {
        "unknown".to_string()
    };

    // locate the notebook file part
    let mut notebook_bytes = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .context("error parsing upload form")?
    {
        if field.name() == Some("notebook") {
            notebook_bytes = Some(
                field
                    .bytes()
                    .await
                    .context("error reading upload")?,
            );
            break;
        }
    }
    let bytes = notebook_bytes.context("no notebook file in the form")?;
    if bytes.len() > MAX_UPLOAD_SIZE {
        return Err(anyhow::anyhow!(
            "upload of {} bytes exceeds the {MAX_UPLOAD_SIZE} byte limit",
            bytes.len()
        )
        .into());
    }
    log::info!("uploaded {} bytes", bytes.len());

    let submission_id = uuid::Uuid::new_v4().to_string();
    let submission_path = opts.upload_dir.join(format!("{submission_id}.ipynb"));
    file_util::write_to_file_with_mode(&bytes, &submission_path, 0o700)
        .context("error writing uploaded file")?;

    // inject the submission identity into the notebook metadata
    let mut data: Value =
        serde_json::from_slice(&bytes).context("could not parse submission as JSON")?;
    let root = data
        .as_object_mut()
        .context("submission is not a JSON object")?;
    if !root.get("metadata").is_some_and(Value::is_object) {
        root.insert("metadata".to_string(), Value::Object(Default::default()));
    }
    if let Some(metadata) = root.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert("submission_id".to_string(), Value::from(submission_id.clone()));
        metadata.insert("user_hash".to_string(), Value::from(user_hash));
        metadata.insert(
            "timestamp".to_string(),
            Value::from(chrono::Utc::now().timestamp()),
        );
    }
    let mutated = serde_json::to_vec(&data).context("error serializing submission")?;

    mirror_to_bucket(&state, &format!("{submission_id}.ipynb"), &mutated);

    let report_url = format!("/report/{submission_id}");
    headers.insert(
        REPORT_URL_HEADER,
        HeaderValue::from_str(&report_url).context("invalid report URL")?,
    );

    if let Some(sender) = &state.inner.queue_sender {
        // asynchronous mode: hand the notebook to the worker pool
        sender
            .send(mutated)
            .context("error posting submission to the queue")?;
        return Ok((headers, Html(templates::upload_result_page(&report_url))).into_response());
    }

    // combined mode: grade inline and render the report right away
    let grader = state
        .inner
        .grader
        .clone()
        .context("no grader configured")?;
    let report = tokio::task::spawn_blocking(move || grader.grade(&mutated))
        .await
        .context("grading task failed")?
        .context("error grading")?;
    let report_path = opts.upload_dir.join(format!("{submission_id}.txt"));
    file_util::write_to_file_with_mode(&report, &report_path, 0o775)
        .context("error writing report")?;
    mirror_to_bucket(&state, &format!("{submission_id}.txt"), &report);

    let page = render_report(&submission_id, &report)?;
    Ok((headers, Html(page)).into_response())
}

// Mirrors submissions and reports into the mounted log bucket. Mirroring
// failures are logged and never fail the request.
fn mirror_to_bucket(state: &AppState, name: &str, bytes: &[u8]) {
    let Some(bucket) = &state.inner.opts.log_bucket else {
        return;
    };
    match file_util::write_to_file(bytes, bucket.join(name)) {
        Ok(()) => log::debug!("mirrored {} bytes to {}/{name}", bytes.len(), bucket.display()),
        Err(err) => log::error!("error mirroring {name} to the log bucket: {err}"),
    }
}

pub(crate) async fn handle_report(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Response, ServerError> {
    let filename = state
        .inner
        .opts
        .upload_dir
        .join(format!("{submission_id}.txt"));
    if !filename.exists() {
        return Ok(placeholder_page(&state, &submission_id).into_response());
    }
    let report = file_util::read_file(&filename).context("error reading report")?;
    let page = render_report(&submission_id, &report)?;
    Ok(Html(page).into_response())
}

// Serves the self-refreshing placeholder while the report is being
// generated: the reload delay grows with the elapsed time, turns into an
// error page past 10s, and resets past 20s so a manual refresh retries.
fn placeholder_page(state: &AppState, submission_id: &str) -> Html<String> {
    let mut reload_ms: i64 = 500;
    if let Ok(mut timestamps) = state.inner.report_timestamp.lock() {
        match timestamps.get(submission_id) {
            None => {
                timestamps.insert(submission_id.to_string(), Instant::now());
            }
            Some(first_seen) => {
                reload_ms = first_seen.elapsed().as_millis() as i64;
            }
        }
        if reload_ms > 20000 {
            timestamps.insert(submission_id.to_string(), Instant::now());
            reload_ms = 500;
        }
    }
    if reload_ms > 10000 {
        return Html(templates::ERROR_PAGE.to_string());
    }
    Html(templates::waiting_page(reload_ms))
}

/// Renders the stored report JSON: per-exercise `report` fragments in
/// ascending exercise-id order wrapped in the styled page.
pub(crate) fn render_report(submission_id: &str, report: &[u8]) -> Result<String, ServerError> {
    let data: Value = serde_json::from_slice(report).context("error parsing report JSON")?;
    let data = data.as_object().context("report is not a JSON object")?;

    let mut exercises = vec![];
    for (exercise_id, entry) in data {
        let Some(entry) = entry.as_object() else {
            continue;
        };
        let Some(html) = entry.get("report").and_then(Value::as_str) else {
            continue;
        };
        exercises.push((exercise_id.clone(), html.to_string()));
    }
    exercises.sort();

    let error = exercises
        .is_empty()
        .then(|| format!("Report {submission_id} contained no checks"));
    Ok(templates::report_page(
        submission_id,
        &exercises,
        error.as_deref(),
    ))
}
