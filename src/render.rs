use crate::config::AppConfig;
use crate::view::{DashboardView, MapView, SummaryPanel, TableView};
use std::fmt::Write;

const MAP_WIDTH_PX: u32 = 500;
const MAP_HEIGHT_PX: u32 = 500;

/// Static page text that does not depend on the selection.
#[derive(Debug, Clone)]
pub struct PageMeta {
    pub title: String,
    pub subtitle: String,
    pub placeholder: String,
    pub geometry_file: String,
    pub geometry_source_url: String,
    pub attributes_file: String,
    pub attributes_source_url: String,
}

impl PageMeta {
    pub fn from_config(config: &AppConfig) -> Self {
        let file_name = |p: &std::path::Path| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Self {
            title: config.display.title.clone(),
            subtitle: config.display.subtitle.clone(),
            placeholder: config.display.placeholder.clone(),
            geometry_file: file_name(&config.input.geometry),
            geometry_source_url: config.display.geometry_source_url.clone(),
            attributes_file: file_name(&config.input.attributes),
            attributes_source_url: config.display.attributes_source_url.clone(),
        }
    }
}

/// Renders the whole page: sidebar with selector and summary, table,
/// map beside the placeholder text, then the data source footnote.
pub fn render_page(view: &DashboardView, meta: &PageMeta) -> String {
    let mut html = String::with_capacity(16 * 1024);
    let _ = write!(
        html,
        r#"<!doctype html>
<html lang="pt-BR">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{title}</title>
  <link rel="stylesheet" href="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.css" crossorigin="anonymous" />
  <script src="https://cdnjs.cloudflare.com/ajax/libs/leaflet/1.9.4/leaflet.js" crossorigin="anonymous"></script>
  <style>{css}</style>
</head>
<body>
<aside class="sidebar">
"#,
        title = escape_html(&meta.title),
        css = PAGE_CSS,
    );

    render_selector(&mut html, view);
    html.push_str("<hr />\n");
    if let Some(summary) = &view.summary {
        render_summary(&mut html, summary);
    }

    let _ = write!(
        html,
        r#"</aside>
<main>
<h1>{title}</h1>
<p class="caption">{subtitle}</p>
<hr />
"#,
        title = escape_html(&meta.title),
        subtitle = escape_html(&meta.subtitle),
    );

    render_table(&mut html, &view.table);
    html.push_str("<hr />\n<div class=\"columns\">\n<div class=\"column\">\n");
    if let Some(map) = &view.map {
        render_map(&mut html, map);
    }
    let _ = write!(
        html,
        "</div>\n<div class=\"column\"><p>{}</p></div>\n</div>\n",
        escape_html(&meta.placeholder)
    );

    render_footnote(&mut html, meta);
    html.push_str("</main>\n</body>\n</html>\n");
    html
}

fn render_selector(html: &mut String, view: &DashboardView) {
    html.push_str(
        "<form method=\"get\" action=\"/\">\n<label for=\"city\">Select a city</label>\n\
         <select id=\"city\" name=\"city\" onchange=\"this.form.submit()\">\n",
    );
    let selected = selected_option(view);
    if view.selection.name().is_none() {
        // Shown only until the first choice; it cannot be picked back.
        html.push_str("<option value=\"\" disabled selected>Select a city</option>\n");
    }
    for (i, name) in view.options.iter().enumerate() {
        let is_selected = selected == Some(i);
        let _ = writeln!(
            html,
            "<option value=\"{v}\"{sel}>{v}</option>",
            v = escape_html(name),
            sel = if is_selected { " selected" } else { "" },
        );
    }
    html.push_str("</select>\n<noscript><button type=\"submit\">Show</button></noscript>\n</form>\n");
}

/// Index of the option to mark: an exact match first, else the first
/// case-insensitive one.
fn selected_option(view: &DashboardView) -> Option<usize> {
    let name = view.selection.name()?;
    view.options.iter().position(|o| o == name).or_else(|| {
        let key = name.to_uppercase();
        view.options.iter().position(|o| o.to_uppercase() == key)
    })
}

fn render_summary(html: &mut String, summary: &SummaryPanel) {
    let _ = write!(
        html,
        "<div class=\"summary\">\nRegião: {}<br />\nEstado: {}<br />\nMunicípio: {}<br />\nPopulação: {}\n</div>\n",
        escape_html(&summary.region),
        escape_html(&summary.state),
        escape_html(&summary.name),
        escape_html(&summary.population),
    );
}

fn render_table(html: &mut String, table: &TableView) {
    html.push_str("<table class=\"records\">\n<thead><tr>");
    for header in ["Região", "UF", "Município", "População", "Código IBGE"] {
        let _ = write!(html, "<th>{}</th>", header);
    }
    // Extra columns follow the first row's layout; every row comes from the same table.
    if let Some(first) = table.rows.first() {
        for (column, _) in &first.extra {
            let _ = write!(html, "<th>{}</th>", escape_html(column));
        }
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in &table.rows {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td class=\"num\">{}</td><td>{}</td>",
            escape_html(&row.region),
            escape_html(&row.state),
            escape_html(&row.name),
            row.formatted_population(),
            escape_html(&row.ibge_code),
        );
        for (_, value) in &row.extra {
            let _ = write!(html, "<td>{}</td>", escape_html(value));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n");

    if table.is_truncated() {
        let _ = writeln!(
            html,
            "<p class=\"caption\">Showing {} of {} rows</p>",
            table.rows.len(),
            table.total_rows
        );
    }
}

fn render_map(html: &mut String, map: &MapView) {
    let features = serde_json::to_string(&map.features)
        .unwrap_or_else(|_| "{\"type\":\"FeatureCollection\",\"features\":[]}".to_string());
    let [[min_lon, min_lat], [max_lon, max_lat]] = map.bounds;
    let _ = write!(
        html,
        r#"<div id="map" style="width:{w}px;height:{h}px" data-code="{code}"></div>
<script>
(function () {{
  var map = L.map('map');
  L.tileLayer('https://{{s}}.tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
    attribution: '&copy; OpenStreetMap contributors'
  }}).addTo(map);
  L.geoJSON({features}).addTo(map);
  map.fitBounds([[{min_lat}, {min_lon}], [{max_lat}, {max_lon}]]);
}})();
</script>
"#,
        w = MAP_WIDTH_PX,
        h = MAP_HEIGHT_PX,
        code = escape_html(&map.code),
        features = script_safe(&features),
    );
}

fn render_footnote(html: &mut String, meta: &PageMeta) {
    let _ = write!(
        html,
        r#"<footer class="caption">
<p>Fonte de Dados</p>
<hr />
<p>The map data is based on the <a href="{url}">{geometry}</a> file from IBGE.</p>
<p>The data is from the <a href="{attributes_url}">{attributes}</a> file.</p>
<hr />
</footer>
"#,
        url = escape_html(&meta.geometry_source_url),
        geometry = escape_html(&meta.geometry_file),
        attributes = escape_html(&meta.attributes_file),
        attributes_url = escape_html(&meta.attributes_source_url),
    );
}

/// Plain-text summary used by the `show` command.
pub fn render_summary_text(summary: &SummaryPanel) -> String {
    format!(
        "Região: {}\nEstado: {}\nMunicípio: {}\nPopulação: {}\n",
        summary.region, summary.state, summary.name, summary.population
    )
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

// JSON embedded in a <script> block must not close it early.
fn script_safe(json: &str) -> String {
    json.replace("</", "<\\/")
}

const PAGE_CSS: &str = r#"
body { margin: 0; display: flex; font-family: "Source Sans Pro", sans-serif; color: #31333f; }
.sidebar { width: 18rem; min-height: 100vh; padding: 2rem 1rem; background: #f0f2f6; box-sizing: border-box; }
.sidebar select { width: 100%; padding: 0.4rem; margin-top: 0.4rem; }
.summary { border: 1px solid #d6d6d9; border-radius: 0.5rem; padding: 1rem; line-height: 1.6; }
main { flex: 1; padding: 2rem 3rem; }
.caption { color: #808495; font-size: 0.875rem; }
table.records { border-collapse: collapse; font-size: 0.875rem; }
table.records th, table.records td { border: 1px solid #e6e9ef; padding: 0.25rem 0.75rem; text-align: left; }
table.records td.num { text-align: right; }
.columns { display: flex; gap: 2rem; }
.column { flex: 1; }
"#;
