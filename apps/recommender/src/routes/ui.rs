//! Presentation page: a form that runs the recommendation pipeline in-process and renders
//! the results as a table.

use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;

use crate::errors::AppError;
use crate::recommend::handlers::RecommendationItem;
use crate::state::AppState;

#[derive(Template)]
#[template(source = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Assessment Recommender</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            line-height: 1.5;
            color: #333;
            max-width: 960px;
            margin: 0 auto;
            padding: 20px;
            background: #f8f9fa;
        }
        .container { background: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }
        textarea { width: 100%; min-height: 160px; font: inherit; }
        input[type=url] { width: 100%; font: inherit; }
        button { margin-top: 12px; padding: 8px 20px; background: #007acc; color: white; border: 0; border-radius: 4px; }
        .error { background: #f8d7da; color: #721c24; padding: 12px; border-radius: 4px; margin: 16px 0; }
        table { width: 100%; border-collapse: collapse; margin-top: 20px; }
        th, td { text-align: left; padding: 8px; border-bottom: 1px solid #ddd; }
        th { background: #f1f3f5; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Assessment Recommender</h1>
        <p>Paste a job description or a link to a job posting.</p>
        <form method="post" action="/">
            <label for="job_description">Job description</label>
            <textarea id="job_description" name="job_description">{{ job_description }}</textarea>
            <label for="url">or job posting URL</label>
            <input type="url" id="url" name="url" value="{{ url }}">
            <button type="submit">Recommend</button>
        </form>

        {% if has_error %}
        <div class="error">{{ error }}</div>
        {% endif %}

        {% if has_results %}
        <table>
            <thead>
                <tr><th>#</th><th>Assessment</th><th>Remote</th><th>Adaptive</th><th>Duration</th><th>Test types</th></tr>
            </thead>
            <tbody>
                {% for row in rows %}
                <tr>
                    <td>{{ loop.index }}</td>
                    <td><a href="{{ row.url }}" target="_blank" rel="noopener">{{ row.name }}</a></td>
                    <td>{{ row.remote }}</td>
                    <td>{{ row.adaptive }}</td>
                    <td>{{ row.duration }}</td>
                    <td>{{ row.test_types }}</td>
                </tr>
                {% endfor %}
            </tbody>
        </table>
        {% endif %}

        {% if no_matches %}
        <p>No assessments matched this job description.</p>
        {% endif %}
    </div>
</body>
</html>"#, ext = "html")]
struct RecommendPage {
    job_description: String,
    url: String,
    has_error: bool,
    error: String,
    has_results: bool,
    no_matches: bool,
    rows: Vec<ResultRow>,
}

struct ResultRow {
    name: String,
    url: String,
    remote: &'static str,
    adaptive: &'static str,
    duration: String,
    test_types: String,
}

impl From<RecommendationItem> for ResultRow {
    fn from(item: RecommendationItem) -> Self {
        Self {
            name: item.name,
            url: item.url,
            remote: yes_no(item.remote_testing),
            adaptive: yes_no(item.adaptive_support),
            duration: item
                .duration
                .map(|d| format!("{d} min"))
                .unwrap_or_else(|| "n/a".to_string()),
            test_types: item.test_types.join(", "),
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

impl RecommendPage {
    fn blank() -> Self {
        Self {
            job_description: String::new(),
            url: String::new(),
            has_error: false,
            error: String::new(),
            has_results: false,
            no_matches: false,
            rows: Vec::new(),
        }
    }

    fn render_html(&self) -> Result<Html<String>, AppError> {
        self.render()
            .map(Html)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("template render failed: {e}")))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendForm {
    #[serde(default)]
    pub job_description: String,
    #[serde(default)]
    pub url: String,
}

/// GET /
pub async fn show_form() -> Result<Html<String>, AppError> {
    RecommendPage::blank().render_html()
}

/// POST /
///
/// The URL field wins when both are filled. Failures are rendered as a banner with the
/// same status the JSON endpoint would return.
pub async fn submit_form(
    State(state): State<AppState>,
    Form(form): Form<RecommendForm>,
) -> Result<Response, AppError> {
    let mut page = RecommendPage {
        job_description: form.job_description.clone(),
        url: form.url.clone(),
        ..RecommendPage::blank()
    };

    let input = [form.url.trim(), form.job_description.trim()]
        .into_iter()
        .find(|s| !s.is_empty());
    let Some(input) = input else {
        page.has_error = true;
        page.error = "Enter a job description or a job posting URL.".to_string();
        return Ok((StatusCode::BAD_REQUEST, page.render_html()?).into_response());
    };

    match state.recommender.recommend(input).await {
        Ok(records) => {
            page.rows = records
                .into_iter()
                .map(|r| ResultRow::from(RecommendationItem::from(r)))
                .collect();
            page.has_results = !page.rows.is_empty();
            page.no_matches = page.rows.is_empty();
            Ok(page.render_html()?.into_response())
        }
        Err(e) => {
            let error = AppError::from(e);
            tracing::warn!("Recommendation from form failed: {error}");
            page.has_error = true;
            page.error = error.public_message();
            Ok((error.status(), page.render_html()?).into_response())
        }
    }
}
