use axum::{
    http::header,
    response::{Html, IntoResponse},
};

pub async fn landing() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=300")],
        Html(LANDING_HTML),
    )
}

const LANDING_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1, shrink-to-fit=no">
    <title>San Diego BC Data</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/bootstrap@4.5.3/dist/css/bootstrap.min.css">
</head>
<body>
    <div class="container" style="padding-top: 3rem;">
        <h1>San Diego Black Carbon Data</h1>
        <p class="lead">
            Black carbon readings from San Diego County air quality monitoring sites,
            October 2019 to January 2021.
        </p>
        <a class="btn btn-dark" href="/dash/">Open the dashboard</a>
    </div>
</body>
</html>
"##;
