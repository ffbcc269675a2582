use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    Json,
};

use tracing::Instrument;

use crate::callbacks::{DependencySpec, UpdateRequest, UpdateResponse};
use crate::common::AppState;
use crate::database::RequestScope;
use crate::error::AppResult;
use crate::layout::PageSpec;

pub async fn dashboard_page() -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "public, max-age=60")],
        Html(DASHBOARD_HTML),
    )
}

/// Page layout
///
/// Navigation, selectors and the chart placeholder. Built once at startup from
/// the site catalog.
#[utoipa::path(
    get,
    path = "/dash/_dash-layout",
    responses(
        (status = 200, description = "Page layout", body = PageSpec),
    ),
    tag = "dashboard"
)]
pub async fn get_layout(State(state): State<AppState>) -> Json<PageSpec> {
    Json(state.page.as_ref().clone())
}

/// Callback wiring
///
/// Which inputs trigger which output.
#[utoipa::path(
    get,
    path = "/dash/_dash-dependencies",
    responses(
        (status = 200, description = "Registered callbacks", body = Vec<DependencySpec>),
    ),
    tag = "dashboard"
)]
pub async fn get_dependencies(State(state): State<AppState>) -> Json<Vec<DependencySpec>> {
    Json(state.callbacks.dependencies())
}

/// Recompute an output
///
/// Runs the callback registered for `output` with the posted input values.
/// Query and validation failures come back as an `error` panel with status 200;
/// only protocol errors (unknown output, missing input) are HTTP errors.
#[utoipa::path(
    post,
    path = "/dash/_dash-update-component",
    request_body = UpdateRequest,
    responses(
        (status = 200, description = "New content for the output", body = UpdateResponse),
        (status = 400, description = "A declared input is missing"),
        (status = 404, description = "No callback for this output"),
        (status = 429, description = "Too many requests"),
    ),
    tag = "dashboard"
)]
pub async fn update_component(
    State(state): State<AppState>,
    scope: RequestScope,
    Json(request): Json<UpdateRequest>,
) -> AppResult<Json<UpdateResponse>> {
    let span = tracing::info_span!("interaction", output = %request.output, seq = ?request.seq);
    let result = state
        .callbacks
        .dispatch(&state, &scope, &request)
        .instrument(span)
        .await;

    if let Err(e) = scope.release().await {
        tracing::warn!(seq = ?request.seq, "Failed to release connection: {e}");
    }

    Ok(Json(UpdateResponse {
        seq: request.seq,
        output: request.output,
        response: result?,
    }))
}

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1, shrink-to-fit=no">
    <title>San Diego BC Data</title>
    <link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/bootstrap@4.5.3/dist/css/bootstrap.min.css">
    <style>
        .control-label { margin-top: 1.5em; display: block; }
        #site-select { min-height: 6em; }
        .chart-placeholder {
            min-height: 450px;
            display: flex;
            align-items: center;
            justify-content: center;
            color: #6c757d;
        }
        .chart-busy { opacity: 0.5; transition: opacity 0.15s; }
    </style>
</head>
<body>
    <nav class="navbar navbar-expand navbar-dark bg-dark">
        <a class="navbar-brand" id="brand" href="/">Home</a>
        <ul class="navbar-nav ml-auto" id="nav-links"></ul>
    </nav>

    <div class="container">
        <div class="row">
            <div class="col-12 col-sm-6 col-md-4">
                <label class="control-label" for="site-select" id="site-label">Location of Sensors</label>
                <select class="form-control" id="site-select" multiple></select>
            </div>
            <div class="col-12 col-sm-6 col-md-4">
                <label class="control-label" id="date-label">Date Selector</label>
                <div class="input-group">
                    <input type="date" class="form-control" id="start-date" aria-label="Start date">
                    <input type="date" class="form-control" id="end-date" aria-label="End date">
                </div>
            </div>
        </div>
        <div class="row">
            <div class="col" id="chart-region">
                <div class="chart-placeholder">Loading...</div>
            </div>
        </div>
    </div>

    <script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
<script>
const BASE = '/dash';

// Idle until an input changes, then Rendering until the newest request answers.
const state = {
    phase: 'idle',
    seq: 0,        // last request issued
    applied: 0,    // last response rendered
    output: null,
    inputs: [],
};

function setPhase(phase) {
    state.phase = phase;
    document.getElementById('chart-region').classList.toggle('chart-busy', phase === 'rendering');
}

function placeholder(text, cls) {
    const region = document.getElementById('chart-region');
    region.innerHTML = '';
    const div = document.createElement('div');
    div.className = 'chart-placeholder' + (cls ? ' ' + cls : '');
    div.textContent = text;
    region.appendChild(div);
}

function renderLayout(page) {
    document.title = page.title;
    const brand = document.getElementById('brand');
    brand.textContent = page.navbar.brand;
    brand.href = page.navbar.brand_href;

    const links = document.getElementById('nav-links');
    links.innerHTML = '';
    for (const link of page.navbar.links) {
        const li = document.createElement('li');
        li.className = 'nav-item';
        const a = document.createElement('a');
        a.className = 'nav-link';
        a.href = link.href;
        a.textContent = link.label;
        li.appendChild(a);
        links.appendChild(li);
    }

    document.getElementById('site-label').textContent = page.site_select.label;
    const select = document.getElementById('site-select');
    select.multiple = page.site_select.multi;
    select.innerHTML = '';
    for (const opt of page.site_select.options) {
        const o = document.createElement('option');
        o.value = opt.value;
        o.textContent = opt.label;
        o.selected = page.site_select.value.includes(opt.value);
        select.appendChild(o);
    }

    const range = page.date_range;
    document.getElementById('date-label').textContent = range.label;
    for (const id of ['start-date', 'end-date']) {
        const input = document.getElementById(id);
        input.min = range.min_date_allowed;
        input.max = range.max_date_allowed;
        // Native pickers open on the current month; the hint points at the data.
        input.placeholder = range.initial_visible_month;
        input.title = `Readings start around ${range.initial_visible_month}`;
    }
}

function currentInputs() {
    const select = document.getElementById('site-select');
    const ids = Array.from(select.selectedOptions).map(o => Number(o.value));
    const start = document.getElementById('start-date').value || null;
    const end = document.getElementById('end-date').value || null;
    const values = {
        'types_dropdown.value': ids,
        'date_picker.start_date': start,
        'date_picker.end_date': end,
    };
    return state.inputs.map(key => {
        const [id, property] = key.split('.');
        return { id, property, value: values[key] ?? null };
    });
}

function renderChart(chart) {
    const region = document.getElementById('chart-region');
    region.innerHTML = '';
    const div = document.createElement('div');
    region.appendChild(div);

    const traces = chart.series.map(s => ({
        type: 'scatter',
        mode: 'lines',
        name: s.name,
        x: s.points.map(p => p.time),
        y: s.points.map(p => p.value),
        line: { color: s.color },
    }));

    const layout = {
        title: { text: chart.title },
        xaxis: {
            type: chart.x_axis.type,
            autorange: chart.x_axis.autorange,
            rangeslider: { visible: !!(chart.x_axis.range_slider && chart.x_axis.range_slider.visible) },
        },
        yaxis: {
            type: chart.y_axis.type,
            autorange: chart.y_axis.autorange,
            title: { text: chart.y_axis.title || '' },
        },
        legend: chart.legend.position === 'below'
            ? { orientation: chart.legend.horizontal ? 'h' : 'v', x: 0, y: -0.35 }
            : { orientation: chart.legend.horizontal ? 'h' : 'v' },
    };

    Plotly.newPlot(div, traces, layout, { displayModeBar: chart.display_mode_bar, responsive: true });
}

function renderPanel(panel) {
    switch (panel.status) {
        case 'chart':
            if (!panel.chart.series.length) {
                placeholder('No readings for this selection');
            } else {
                renderChart(panel.chart);
            }
            break;
        case 'prompt':
            placeholder(panel.message);
            break;
        case 'error':
            placeholder(panel.message, 'text-danger');
            break;
    }
}

async function update() {
    const seq = ++state.seq;
    setPhase('rendering');
    try {
        const res = await fetch(`${BASE}/_dash-update-component`, {
            method: 'POST',
            headers: { 'Content-Type': 'application/json' },
            body: JSON.stringify({ output: state.output, inputs: currentInputs(), seq }),
        });
        const body = await res.json();
        // Drop answers that arrive after a newer one was already drawn.
        if (seq < state.applied) return;
        state.applied = seq;
        if (!res.ok) {
            placeholder(body.error || `Request failed (${res.status})`, 'text-danger');
        } else {
            renderPanel(body.response);
        }
    } catch (e) {
        console.error('Update failed:', e);
        if (seq >= state.applied) {
            state.applied = seq;
            placeholder('Could not reach the server', 'text-danger');
        }
    } finally {
        if (seq === state.seq) setPhase('idle');
    }
}

async function init() {
    const [page, deps] = await Promise.all([
        fetch(`${BASE}/_dash-layout`).then(r => r.json()),
        fetch(`${BASE}/_dash-dependencies`).then(r => r.json()),
    ]);
    renderLayout(page);

    const chartDep = deps.find(d => d.output === `${page.chart_region.id}.children`);
    if (!chartDep) {
        placeholder('Dashboard is misconfigured', 'text-danger');
        return;
    }
    state.output = chartDep.output;
    state.inputs = chartDep.inputs;

    document.getElementById('site-select').addEventListener('change', update);
    for (const id of ['start-date', 'end-date']) {
        const input = document.getElementById(id);
        input.addEventListener('change', update);
    }

    update();
}

init().catch(e => {
    console.error('Failed to load dashboard:', e);
    placeholder('Failed to load dashboard', 'text-danger');
});
</script>
</body>
</html>
"##;
