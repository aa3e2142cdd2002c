//! Lethality case loader: CLI.

use clap::{Parser, Subcommand};
use pk_model::catalog::{case_names, conditions, discover_cases, match_case};
use pk_model::config::LoadConfig;
use pk_model::model::{load_case, Model};
use pk_model::parser::{parse_kill_label, read_kill_file};
use pk_model::report::{write_html_report, write_json_report};
use pk_model::store::{CaseOutcome, Store};
use pk_model::util::init_logging;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pk-model")]
#[command(about = "Load lethality cases (AV, surface, kill, PK matrix, detail) into one checked model")]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML file with load settings (blast_margin, max_input_bytes, max_kill_depth, require_matrix).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load one case from its manifest and print a summary.
    Load {
        manifest: PathBuf,
        #[arg(long, value_name = "FILE", help = "Also write the model summary as JSON")]
        json: Option<PathBuf>,
    },
    /// Resolve a kill definition into component ids.
    Kill {
        kill_file: PathBuf,
        /// Kill id, e.g. k1.
        kill: String,
        #[arg(long)]
        node: Option<u32>,
    },
    /// Load every case in a directory; store results and emit reports.
    Scan {
        #[arg(long, value_name = "DIR")]
        dir: PathBuf,
        #[arg(long, value_name = "DIR", default_value = "out")]
        out: PathBuf,
    },
    /// Find the manifest for a case and its terminal conditions.
    Find {
        #[arg(long, value_name = "DIR")]
        dir: PathBuf,
        #[arg(long)]
        case: String,
        #[arg(long)]
        aof: String,
        #[arg(long)]
        term_vel: String,
        #[arg(long)]
        burst_height: String,
    },
    /// List cases in a directory, or the cases of the latest stored scan.
    Cases {
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
        #[arg(long, value_name = "DB")]
        scan_db: Option<PathBuf>,
    },
}

fn main() -> Result<(), String> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = match &cli.config {
        Some(path) => LoadConfig::from_toml_file(path).map_err(|e| e.to_string())?,
        None => LoadConfig::default(),
    };

    match cli.command {
        Commands::Load { manifest, json } => run_load(&manifest, json, &config),
        Commands::Kill {
            kill_file,
            kill,
            node,
        } => run_kill(&kill_file, &kill, node, &config),
        Commands::Scan { dir, out } => run_scan(&dir, &out, &config),
        Commands::Find {
            dir,
            case,
            aof,
            term_vel,
            burst_height,
        } => run_find(&dir, &case, &aof, &term_vel, &burst_height),
        Commands::Cases { dir, scan_db } => run_cases(dir, scan_db),
    }
}

fn run_load(manifest: &Path, json: Option<PathBuf>, config: &LoadConfig) -> Result<(), String> {
    let model = load_case(manifest, config).map_err(|e| e.to_string())?;
    print_model(&model);
    if let Some(path) = json {
        let s = serde_json::to_string_pretty(&model.summary()).map_err(|e| e.to_string())?;
        fs::write(&path, s).map_err(|e| e.to_string())?;
        tracing::info!("wrote {}", path.display());
    }
    Ok(())
}

fn ids(set: &BTreeSet<u32>) -> String {
    if set.is_empty() {
        return "none".to_string();
    }
    set.iter().map(u32::to_string).collect::<Vec<_>>().join(" ")
}

fn print_model(model: &Model) {
    let m = model.manifest();
    let opt = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
    println!("Case: {}", model.case_name());
    println!(
        "Terminal velocity: {}  Burst height: {}  Attack azimuth: {}{}  Angle of fall: {}",
        opt(m.term_vel),
        opt(m.burst_height),
        opt(m.attack_az),
        if m.az_averaging { " (averaged)" } else { "" },
        opt(m.aof)
    );
    println!(
        "Components: {}  Surfaces: {}  Volume radius: {:.2}",
        model.components().len(),
        model.surfaces().num_surfaces(),
        model.volume_radius()
    );
    let c = model.target_center();
    println!("Target center: {:.3} {:.3} {:.3}", c.x, c.y, c.z);
    match model.active_kill() {
        Some(k) => println!(
            "Kill: k{} ({})",
            k,
            m.kill_description.as_deref().unwrap_or("-")
        ),
        None => println!("Kill: none (classes unfiltered)"),
    }
    let classes = model.classes();
    println!("\nComponent classes:");
    println!("  direct hit:   {}", ids(&classes.direct_hit));
    println!("  blast:        {}", ids(&classes.blast));
    println!("  fragment:     {}", ids(&classes.fragment));
    println!("  invulnerable: {}", ids(&classes.invulnerable));
    if let Some(grid) = model.matrix() {
        println!(
            "\nPK matrix k{}: {} x {} cells, mean PK {:.3}, max PK {:.3}",
            grid.kill,
            grid.cells_range,
            grid.cells_defl,
            grid.mean_pk(),
            grid.max_pk()
        );
    }
    if let Some(detail) = model.detail() {
        println!("Detail records: {}", detail.records.len());
    }
    println!("\nNotices:");
    for n in model.notices() {
        println!("  [{}] {} - {}", n.code, n.severity.label(), n.summary);
    }
    if model.notices().is_empty() {
        println!("  None");
    }
}

fn run_kill(kill_file: &Path, kill: &str, node: Option<u32>, config: &LoadConfig) -> Result<(), String> {
    let kill_id = parse_kill_label(kill).ok_or_else(|| format!("not a kill id: {}", kill))?;
    let tree = read_kill_file(kill_file, None, config.max_input_bytes)
        .map_err(|e| e.to_string())?
        .with_max_depth(config.max_kill_depth);
    let comps = tree
        .extract_components(kill_id, node)
        .map_err(|e| e.to_string())?;
    let unique: BTreeSet<u32> = comps.iter().copied().collect();
    if let Some(h) = tree.kills.iter().find(|h| h.kill == kill_id) {
        println!("k{}: {}", kill_id, h.description);
    }
    println!(
        "resolved: {}",
        comps.iter().map(u32::to_string).collect::<Vec<_>>().join(" ")
    );
    println!("components: {}", ids(&unique));
    Ok(())
}

fn run_scan(dir: &Path, out: &Path, config: &LoadConfig) -> Result<(), String> {
    if !dir.is_dir() {
        return Err(format!("case directory does not exist: {}", dir.display()));
    }
    let dir_canon = dir.canonicalize().map_err(|e| e.to_string())?;
    let stems = discover_cases(&dir_canon)?;
    let mut cases = Vec::with_capacity(stems.len());
    for stem in &stems {
        let manifest = dir_canon.join(format!("{}.out", stem));
        match load_case(&manifest, config) {
            Ok(model) => cases.push(CaseOutcome::Loaded(Box::new(model.summary()))),
            Err(e) => {
                tracing::warn!("{}: {}", stem, e);
                cases.push(CaseOutcome::Failed {
                    stem: stem.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    fs::create_dir_all(out).map_err(|e| e.to_string())?;
    let mut store = Store::open(&out.join("scan.sqlite"))?;
    store.insert_scan(dir_canon.to_string_lossy().as_ref(), &cases)?;
    let failed = cases
        .iter()
        .filter(|c| matches!(c, CaseOutcome::Failed { .. }))
        .count();
    tracing::info!("stored scan with {} case(s), {} failed", cases.len(), failed);

    let json_path = out.join("report.json");
    write_json_report(&cases, &json_path)?;
    let html_dir = out.join("html");
    write_html_report(&cases, &html_dir)?;
    tracing::info!("wrote {} and {}", json_path.display(), html_dir.display());
    Ok(())
}

fn run_find(
    dir: &Path,
    case: &str,
    aof: &str,
    term_vel: &str,
    burst_height: &str,
) -> Result<(), String> {
    let stems = discover_cases(dir)?;
    match match_case(&stems, case, aof, term_vel, burst_height) {
        Some(stem) => {
            println!("{}", dir.join(format!("{}.out", stem)).display());
            Ok(())
        }
        None => {
            let c = conditions(&stems, case);
            Err(format!(
                "no single case matches {} at {}-{}-{} (angles of fall: {}; velocities: {}; burst heights: {})",
                case,
                aof,
                term_vel,
                burst_height,
                c.aofs.join(", "),
                c.term_vels.join(", "),
                c.burst_heights.join(", ")
            ))
        }
    }
}

fn run_cases(dir: Option<PathBuf>, scan_db: Option<PathBuf>) -> Result<(), String> {
    if let Some(db_path) = scan_db {
        let store = Store::open(&db_path)?;
        let scans = store.list_scans()?;
        let Some(scan) = scans.first() else {
            return Err("scan database has no scans".to_string());
        };
        println!("Scan {} of {} at {}", scan.id, scan.case_dir, scan.created_at);
        for c in store.get_scan_cases(scan.id)? {
            match c {
                CaseOutcome::Loaded(s) => println!(
                    "  {}  components={}  kill={}  notices={}",
                    s.case_name,
                    s.num_components,
                    s.active_kill
                        .map(|k| format!("k{}", k))
                        .unwrap_or_else(|| "-".to_string()),
                    s.notices.len()
                ),
                CaseOutcome::Failed { stem, error } => println!("  {}  FAILED: {}", stem, error),
            }
        }
        return Ok(());
    }
    if let Some(dir) = dir {
        let stems = discover_cases(&dir)?;
        for name in case_names(&stems) {
            let c = conditions(&stems, &name);
            println!(
                "{}  aof [{}]  term vel [{}]  burst height [{}]",
                name,
                c.aofs.join(", "),
                c.term_vels.join(", "),
                c.burst_heights.join(", ")
            );
        }
        return Ok(());
    }
    Err("provide --dir or --scan-db".to_string())
}
