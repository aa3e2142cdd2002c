//! JSON and HTML report generation.

use crate::model::{ModelSummary, PkGrid};
use crate::notice::NoticeSeverity;
use crate::store::CaseOutcome;
use crate::util::slug;
use serde_json::json;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:1rem;} table{border-collapse:collapse;} th,td{border:1px solid #ccc;padding:6px;} a{color:#06c;} .info{color:#666;} .warn{color:#c60;} .err{color:#c00;}";

pub fn write_json_report(cases: &[CaseOutcome], path: &Path) -> Result<(), String> {
    let items: Vec<serde_json::Value> = cases
        .iter()
        .map(|c| match c {
            CaseOutcome::Loaded(s) => json!({ "stem": c.stem(), "summary": s }),
            CaseOutcome::Failed { error, .. } => json!({ "stem": c.stem(), "error": error }),
        })
        .collect();
    let json = serde_json::to_string_pretty(&items).map_err(|e| e.to_string())?;
    fs::write(path, json).map_err(|e| e.to_string())?;
    Ok(())
}

pub fn write_html_report(cases: &[CaseOutcome], out_dir: &Path) -> Result<(), String> {
    fs::create_dir_all(out_dir).map_err(|e| e.to_string())?;
    fs::write(out_dir.join("index.html"), render_index(cases)).map_err(|e| e.to_string())?;
    for c in cases {
        if let CaseOutcome::Loaded(s) = c {
            let path = out_dir.join(format!("case_{}.html", slug(&s.case_name)));
            fs::write(path, render_case_page(s)).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

fn page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>{}</title>
<style>{}</style>
</head>
<body>
{}
</body>
</html>"#,
        html_escape(title),
        STYLE,
        body
    )
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn render_index(cases: &[CaseOutcome]) -> String {
    let rows: String = cases
        .iter()
        .map(|c| match c {
            CaseOutcome::Loaded(s) => format!(
                r#"<tr><td><a href="case_{}.html">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
                slug(&s.case_name),
                html_escape(&s.case_name),
                s.num_components,
                s.active_kill.map(|k| format!("k{}", k)).unwrap_or_else(|| "-".to_string()),
                s.matrix
                    .as_ref()
                    .map(|m| format!("{:.3}", m.max_pk()))
                    .unwrap_or_else(|| "-".to_string()),
                s.notices.len(),
                "ok"
            ),
            CaseOutcome::Failed { stem, error } => format!(
                r#"<tr><td>{}</td><td></td><td></td><td></td><td></td><td class="err">{}</td></tr>"#,
                html_escape(stem),
                html_escape(error)
            ),
        })
        .collect();
    let body = format!(
        r#"<h1>Lethality cases</h1>
<table><thead><tr><th>Case</th><th>Components</th><th>Kill</th><th>Max PK</th><th>Notices</th><th>Status</th></tr></thead>
<tbody>{}</tbody>
</table>"#,
        rows
    );
    page("Lethality cases", &body)
}

fn id_list(ids: &BTreeSet<u32>) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter().map(u32::to_string).collect::<Vec<_>>().join(" ")
}

fn render_grid(grid: &PkGrid) -> String {
    let header: String = grid
        .midpoints_defl
        .iter()
        .map(|d| format!("<th>{:.2}</th>", d))
        .collect();
    let rows: String = (0..grid.cells_range)
        .map(|r| {
            let cells: String = grid
                .row(r)
                .unwrap_or(&[])
                .iter()
                .map(|pk| format!("<td>{:.3}</td>", pk))
                .collect();
            format!(
                "<tr><th>{:.2}</th>{}</tr>",
                grid.midpoints_range.get(r).copied().unwrap_or(0.0),
                cells
            )
        })
        .collect();
    format!(
        "<h2>PK matrix (k{})</h2>\n<p>Mean PK {:.3}, max PK {:.3}</p>\n<table><thead><tr><th>range \\ defl</th>{}</tr></thead><tbody>{}</tbody></table>",
        grid.kill,
        grid.mean_pk(),
        grid.max_pk(),
        header,
        rows
    )
}

fn render_case_page(s: &ModelSummary) -> String {
    let notices: String = s
        .notices
        .iter()
        .map(|n| {
            let class = match n.severity {
                NoticeSeverity::Info => "info",
                NoticeSeverity::Warn => "warn",
            };
            format!(
                r#"<li class="{}"><strong>{}:</strong> {} <br><em>{}</em></li>"#,
                class,
                html_escape(&n.code),
                html_escape(&n.summary),
                html_escape(&n.technical)
            )
        })
        .collect();
    let grid = s
        .matrix
        .as_ref()
        .map(render_grid)
        .unwrap_or_else(|| "<p>No PK matrix.</p>".to_string());
    let body = format!(
        r#"<h1>{}</h1>
<p><a href="index.html">Back to list</a></p>
<table><tbody>
<tr><th>Terminal velocity</th><td>{}</td></tr>
<tr><th>Burst height</th><td>{}</td></tr>
<tr><th>Attack azimuth</th><td>{}{}</td></tr>
<tr><th>Angle of fall</th><td>{}</td></tr>
<tr><th>Kill</th><td>{}</td></tr>
<tr><th>Volume radius</th><td>{:.2}</td></tr>
</tbody></table>
<h2>Component classes</h2>
<table><tbody>
<tr><th>Direct hit</th><td>{}</td></tr>
<tr><th>Blast</th><td>{}</td></tr>
<tr><th>Fragment</th><td>{}</td></tr>
<tr><th>Invulnerable</th><td>{}</td></tr>
</tbody></table>
{}
<h2>Notices</h2>
<ul>{}</ul>"#,
        html_escape(&s.case_name),
        fmt_opt(s.term_vel),
        fmt_opt(s.burst_height),
        fmt_opt(s.attack_az),
        if s.az_averaging { " (averaged)" } else { "" },
        fmt_opt(s.aof),
        html_escape(s.kill_description.as_deref().unwrap_or("-")),
        s.volume_radius,
        id_list(&s.classes.direct_hit),
        id_list(&s.classes.blast),
        id_list(&s.classes.fragment),
        id_list(&s.classes.invulnerable),
        grid,
        if notices.is_empty() {
            "<li>None</li>".to_string()
        } else {
            notices
        }
    );
    page(&s.case_name, &body)
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ComponentSets;
    use crate::notice::Notice;
    use glam::DVec3;

    fn summary() -> ModelSummary {
        ModelSummary {
            case_name: "tank_run1_45-300-0".to_string(),
            manifest_path: "cases/tank_run1_45-300-0.out".to_string(),
            term_vel: Some(300.0),
            burst_height: Some(0.0),
            attack_az: Some(45.0),
            az_averaging: false,
            aof: Some(45.0),
            num_components: 3,
            num_tables: 3,
            num_azimuths: 1,
            num_elevations: 1,
            num_surfaces: 2,
            bounds: None,
            kill_description: Some("Mobility <kill>".to_string()),
            active_kill: Some(1),
            classes: ComponentSets::default(),
            target_center: DVec3::ZERO,
            volume_radius: 12.0,
            matrix: Some(PkGrid {
                kill: 1,
                cells_range: 1,
                cells_defl: 2,
                offset_range: 0.0,
                offset_defl: 0.0,
                raw_extent_range: Some((0.0, 1.0)),
                raw_extent_defl: Some((0.0, 2.0)),
                gridlines_range: vec![0.0, -1.0],
                gridlines_defl: vec![0.0, -1.0, -2.0],
                midpoints_range: vec![-0.5],
                midpoints_defl: vec![-0.5, -1.5],
                cell_sizes_range: vec![1.0],
                cell_sizes_defl: vec![1.0, 1.0],
                pks: vec![0.25, 0.75],
            }),
            detail_records: None,
            notices: vec![Notice::pk_clipped(1, 2)],
        }
    }

    #[test]
    fn html_report_sanity() {
        let cases = vec![
            CaseOutcome::Loaded(Box::new(summary())),
            CaseOutcome::Failed {
                stem: "bad_run_1-2-3".to_string(),
                error: "case not usable".to_string(),
            },
        ];
        let dir = tempfile::tempdir().unwrap();
        write_html_report(&cases, dir.path()).unwrap();
        assert!(dir.path().join("index.html").exists());
        let page = fs::read_to_string(dir.path().join("case_tank_run1_45-300-0.html")).unwrap();
        assert!(page.contains("Mobility &lt;kill&gt;"));
        assert!(page.contains("<td>0.750</td>"));
        assert!(page.contains("PK_CLIPPED"));

        let json_path = dir.path().join("report.json");
        write_json_report(&cases, &json_path).unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(v[1]["error"], "case not usable");
        assert_eq!(v[0]["summary"]["active_kill"], 1);
    }
}
