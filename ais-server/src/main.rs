//! ais: CLI + websocket server for AIS track queries.

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::error;
use tracing_subscriber::EnvFilter;

use ais_core::config::Config;
use ais_core::decode::Decoder;
use ais_core::encoder::{encode, to_geojson, Outcome, ServerMessage, TrackVector};
use ais_core::mid::flag_from_mmsi;
use ais_core::network::{transit_counts, transit_edges, TransitEdge};
use ais_core::protocol::parse_time;
use ais_core::types::{
    ship_type_text, AisMessage, BoundingBox, Mmsi, QueryError, QueryKind, QueryRequest,
};
use ais_core::wsa::wetted_surface_area;
use ais_core::zones::ZoneSet;

mod db;
mod engine;
mod ingest;
mod session;
mod store;
mod web;

use engine::{terminal_message, CancelFlag, EngineConfig, QueryEngine, ResultSink};
use store::SqliteStore;

#[derive(Parser)]
#[command(name = "ais", version, about = "AIS decoder, track database and query server")]
struct Cli {
    /// Config file (default: ~/.aisdb/config.yaml)
    #[arg(long, global = true, env = "AISDB_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode AIVDM sentences from a file and print a vessel table
    Decode {
        /// File of NMEA sentences or JSON records, one per line (`-` for stdin)
        file: PathBuf,

        /// Print each decoded message instead of the summary table
        #[arg(short, long)]
        raw: bool,
    },

    /// Decode raw files into the database
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// SQLite database path
        #[arg(long)]
        db_path: Option<String>,

        /// Timestamp for sentences that carry none (epoch or date)
        #[arg(long)]
        default_time: Option<String>,
    },

    /// Run one query and print the result messages, one per line
    Query {
        #[arg(long)]
        db_path: Option<String>,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Bounding box `x0,y0,x1,y1` in degrees
        #[arg(long, allow_hyphen_values = true)]
        area: String,

        /// Heatmap points instead of track vectors
        #[arg(long)]
        heatmap: bool,

        /// Print GeoJSON features instead of wire messages
        #[arg(long)]
        geojson: bool,

        #[arg(long)]
        zones_dir: Option<String>,
    },

    /// Zone-to-zone transit edges for tracks in an area
    Network {
        #[arg(long)]
        db_path: Option<String>,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Bounding box `x0,y0,x1,y1` in degrees
        #[arg(long, allow_hyphen_values = true)]
        area: String,

        /// Zone polygons used as graph nodes
        #[arg(long)]
        zones_dir: Option<String>,

        /// Only edges that leave one zone for another
        #[arg(long)]
        transits_only: bool,
    },

    /// Estimate wetted hull surface area from deadweight tonnage
    Hull {
        /// ITU ship type code
        #[arg(long)]
        ship_type: u8,

        /// Summer deadweight, tonnes
        #[arg(long)]
        deadweight: f64,
    },

    /// Run the websocket server
    Serve {
        #[arg(long)]
        db_path: Option<String>,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,

        #[arg(long)]
        zones_dir: Option<String>,
    },

    /// Show database statistics
    Stats {
        #[arg(long)]
        db_path: Option<String>,
    },
}

/// Latest known state of a vessel while decoding.
#[derive(Default)]
struct VesselSummary {
    name: Option<String>,
    ship_type: Option<u8>,
    lat: Option<f64>,
    lon: Option<f64>,
    sog: Option<f64>,
    cog: Option<f64>,
    messages: u32,
}

impl VesselSummary {
    fn update(&mut self, msg: &AisMessage) {
        self.messages += 1;
        if let Some(p) = msg.position() {
            self.lat = Some(p.lat);
            self.lon = Some(p.lon);
            self.sog = p.sog.or(self.sog);
            self.cog = p.cog.or(self.cog);
        }
        if let Some(s) = msg.static_data() {
            if let Some(name) = s.name.as_deref().filter(|n| !n.is_empty()) {
                self.name = Some(name.to_string());
            }
            self.ship_type = s.ship_type.or(self.ship_type);
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Error loading configuration: {e}");
        std::process::exit(1);
    });

    match cli.command {
        Commands::Decode { file, raw } => cmd_decode(file, raw, &config),
        Commands::Ingest {
            files,
            db_path,
            default_time,
        } => {
            override_db(&mut config, db_path);
            cmd_ingest(&files, default_time.as_deref(), &config);
        }
        Commands::Query {
            db_path,
            start,
            end,
            area,
            heatmap,
            geojson,
            zones_dir,
        } => {
            override_db(&mut config, db_path);
            if zones_dir.is_some() {
                config.zones.dir = zones_dir;
            }
            let kind = if heatmap {
                QueryKind::Heatmap
            } else {
                QueryKind::TrackVectors
            };
            cmd_query(&config, kind, &start, &end, &area, geojson).await;
        }
        Commands::Network {
            db_path,
            start,
            end,
            area,
            zones_dir,
            transits_only,
        } => {
            override_db(&mut config, db_path);
            if zones_dir.is_some() {
                config.zones.dir = zones_dir;
            }
            cmd_network(&config, &start, &end, &area, transits_only).await;
        }
        Commands::Hull { ship_type, deadweight } => {
            let area = wetted_surface_area(deadweight, Some(ship_type));
            println!(
                "{}: {area:.0} m^2",
                ship_type_text(ship_type).unwrap_or("Unknown type")
            );
        }
        Commands::Serve {
            db_path,
            host,
            port,
            zones_dir,
        } => {
            override_db(&mut config, db_path);
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if zones_dir.is_some() {
                config.zones.dir = zones_dir;
            }
            if let Err(e) = web::serve(&config).await {
                error!(error = %e, "server stopped");
                std::process::exit(1);
            }
        }
        Commands::Stats { db_path } => {
            override_db(&mut config, db_path);
            cmd_stats(&config.database.path);
        }
    }
}

fn override_db(config: &mut Config, db_path: Option<String>) {
    if let Some(path) = db_path {
        config.database.path = path;
    }
}

fn open_input(file: &PathBuf) -> Box<dyn BufRead> {
    if file.to_str() == Some("-") {
        return Box::new(io::stdin().lock());
    }
    let f = std::fs::File::open(file).unwrap_or_else(|e| {
        eprintln!("Error opening {}: {e}", file.display());
        std::process::exit(1);
    });
    Box::new(io::BufReader::new(f))
}

fn open_db(db_path: &str) -> db::Database {
    db::Database::open(db_path).unwrap_or_else(|e| {
        eprintln!("Error opening database {db_path}: {e}");
        std::process::exit(1);
    })
}

fn parse_time_arg(s: &str) -> Option<i64> {
    parse_time(&serde_json::Value::String(s.to_string()))
}

fn parse_area(s: &str) -> Option<BoundingBox> {
    let v: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    match v.as_slice() {
        [x0, y0, x1, y1] => Some(BoundingBox::new(*x0, *y0, *x1, *y1)),
        _ => None,
    }
}

fn cmd_decode(file: PathBuf, raw: bool, config: &Config) {
    let reader = open_input(&file);
    let mut decoder = Decoder::new(config.decoder.fragment_window, config.decoder.fragment_capacity);
    decoder.set_default_timestamp(Some(0));
    let mut vessels: HashMap<Mmsi, VesselSummary> = HashMap::new();

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Ok(Some(msg)) = decoder.decode(line.as_bytes()) else {
            continue;
        };
        if raw {
            println!("{msg:?}");
        }
        vessels.entry(msg.mmsi()).or_default().update(&msg);
    }

    if !raw {
        print_summary(&vessels, &decoder);
    }
}

fn cmd_ingest(files: &[PathBuf], default_time: Option<&str>, config: &Config) {
    let default_timestamp = default_time.map(|s| {
        parse_time_arg(s).unwrap_or_else(|| {
            eprintln!("Invalid --default-time: {s}");
            std::process::exit(1);
        })
    });
    let db_path = &config.database.path;
    let mut database = open_db(db_path);

    let summary = ingest::ingest_files(&mut database, files, &config.decoder, default_timestamp)
        .unwrap_or_else(|e| {
            eprintln!("Ingest failed: {e}");
            std::process::exit(1);
        });

    println!();
    println!("Ingest complete: {} file(s)", summary.files);
    println!(
        "  Records: {} read, {} decoded, {} dropped",
        summary.records,
        summary.decoded,
        summary.total_dropped()
    );
    println!(
        "  Stored: {} positions, {} static reports",
        summary.positions, summary.statics
    );
    if summary.incomplete_fragments > 0 {
        println!("  Incomplete fragment groups: {}", summary.incomplete_fragments);
    }

    if !summary.dropped.is_empty() {
        println!();
        let mut table = Table::new();
        table.set_header(vec!["Drop reason", "Records"]);
        for (reason, count) in &summary.dropped {
            table.add_row(vec![Cell::new(reason), Cell::new(count)]);
        }
        println!("{table}");
    }
}

/// Prints each result message on its own line.
struct PrintSink {
    geojson: bool,
}

impl PrintSink {
    fn print(&self, msg: &ServerMessage) {
        if self.geojson {
            if let Some(feature) = to_geojson(msg) {
                println!("{feature}");
            }
        } else {
            println!("{}", String::from_utf8_lossy(&encode(msg)));
        }
    }
}

#[async_trait]
impl ResultSink for PrintSink {
    async fn send(&mut self, msg: ServerMessage) -> Result<(), QueryError> {
        self.print(&msg);
        Ok(())
    }
}

/// Collects track segments for offline analysis.
#[derive(Default)]
struct CollectSink {
    vectors: Vec<TrackVector>,
}

#[async_trait]
impl ResultSink for CollectSink {
    async fn send(&mut self, msg: ServerMessage) -> Result<(), QueryError> {
        if let ServerMessage::TrackVector(v) = msg {
            self.vectors.push(v);
        }
        Ok(())
    }
}

/// Parse CLI query arguments and build an engine over the configured store.
fn query_setup(config: &Config, start: &str, end: &str, area: &str) -> (QueryEngine, Arc<ZoneSet>, QueryRequest) {
    let (Some(start), Some(end)) = (parse_time_arg(start), parse_time_arg(end)) else {
        eprintln!("Invalid --start or --end time");
        std::process::exit(1);
    };
    let Some(area) = parse_area(area) else {
        eprintln!("Invalid --area, expected x0,y0,x1,y1");
        std::process::exit(1);
    };

    let zones = match &config.zones.dir {
        Some(dir) => ZoneSet::load_dir(std::path::Path::new(dir)).unwrap_or_else(|e| {
            eprintln!("Error loading zones from {dir}: {e}");
            std::process::exit(1);
        }),
        None => ZoneSet::default(),
    };
    let zones = Arc::new(zones);
    let engine = QueryEngine::new(
        Arc::new(SqliteStore::new(config.database.path.clone())),
        Arc::clone(&zones),
        EngineConfig::from(config),
    );
    (engine, zones, QueryRequest::tracks(area, start, end))
}

fn exit_on_error(terminal: &ServerMessage) {
    if let ServerMessage::Done {
        outcome: Outcome::Error,
        status,
    } = terminal
    {
        eprintln!("Query failed: {status}");
        std::process::exit(1);
    }
}

async fn cmd_query(config: &Config, kind: QueryKind, start: &str, end: &str, area: &str, geojson: bool) {
    let (engine, _, mut req) = query_setup(config, start, end, area);
    req.kind = kind;
    let mut sink = PrintSink { geojson };
    let terminal = match engine.execute(&req, &CancelFlag::new(), &mut sink).await {
        Ok(completion) => terminal_message(kind, completion),
        Err(e) => ServerMessage::error(e.to_string()),
    };
    if !geojson {
        sink.print(&terminal);
    }
    exit_on_error(&terminal);
}

async fn cmd_network(config: &Config, start: &str, end: &str, area: &str, transits_only: bool) {
    let (engine, zones, req) = query_setup(config, start, end, area);
    if zones.is_empty() {
        eprintln!("No zones loaded: set --zones-dir or zones.dir");
        std::process::exit(1);
    }
    let mut sink = CollectSink::default();
    if let Err(e) = engine.execute(&req, &CancelFlag::new(), &mut sink).await {
        eprintln!("Query failed: {e}");
        std::process::exit(1);
    }

    let edges: Vec<TransitEdge> = sink
        .vectors
        .iter()
        .flat_map(|v| transit_edges(&v.segment, &zones))
        .filter(|e| !transits_only || e.is_transit())
        .collect();
    print_edges(&edges);
}

fn print_edges(edges: &[TransitEdge]) {
    println!();
    println!("Edges: {}", edges.len());
    println!();
    if edges.is_empty() {
        return;
    }

    let time = |t: i64| {
        chrono::DateTime::from_timestamp(t, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or("-".into())
    };
    let mut table = Table::new();
    table.set_header(vec![
        "MMSI", "Seg", "Nodes", "First seen", "Last seen", "Minutes", "Dist (m)", "Path (m)", "Kts min/avg/max",
    ]);
    for e in edges {
        table.add_row(vec![
            Cell::new(e.mmsi),
            Cell::new(e.segment),
            Cell::new(e.transit_nodes()),
            Cell::new(time(e.first_seen)),
            Cell::new(time(e.last_seen)),
            Cell::new(e.minutes_in_zone().map(|m| format!("{m:.2}")).unwrap_or("-".into())),
            Cell::new(format!("{:.0}", e.total_distance_m)),
            Cell::new(format!("{:.0}", e.cumulative_distance_m)),
            Cell::new(
                e.velocity_knots
                    .map(|s| format!("{:.2}/{:.2}/{:.2}", s.min, s.avg, s.max))
                    .unwrap_or("-".into()),
            ),
        ]);
    }
    println!("{table}");

    let counts = transit_counts(edges);
    if !counts.is_empty() {
        println!();
        let mut table = Table::new();
        table.set_header(vec!["From", "To", "Transits"]);
        for ((src, rcv), n) in &counts {
            table.add_row(vec![Cell::new(src), Cell::new(rcv), Cell::new(n)]);
        }
        println!("{table}");
    }
}

fn cmd_stats(db_path: &str) {
    let database = open_db(db_path);
    let stats = database.stats().unwrap_or_else(|e| {
        eprintln!("Error reading database {db_path}: {e}");
        std::process::exit(1);
    });

    let time = |t: Option<i64>| {
        t.and_then(|t| chrono::DateTime::from_timestamp(t, 0))
            .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or("-".into())
    };

    println!();
    println!("Database: {db_path}");
    println!();
    println!("  Vessels:         {}", stats.vessels);
    println!("  Positions:       {}", stats.positions);
    println!("  Static reports:  {}", stats.static_reports);
    println!("  First report:    {}", time(stats.first_time));
    println!("  Last report:     {}", time(stats.last_time));
    println!();
}

fn print_summary(vessels: &HashMap<Mmsi, VesselSummary>, decoder: &Decoder) {
    println!();
    println!(
        "Records: {} read, {} decoded, {} dropped, {} vessels",
        decoder.total_records,
        decoder.decoded,
        decoder.dropped,
        vessels.len()
    );
    println!();

    if vessels.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "MMSI", "Name", "Flag", "Type", "Lat", "Lon", "SOG (kts)", "COG", "Msgs",
    ]);

    let mut sorted: Vec<_> = vessels.iter().collect();
    sorted.sort_by_key(|(mmsi, v)| (std::cmp::Reverse(v.messages), **mmsi));

    for (mmsi, v) in sorted {
        table.add_row(vec![
            Cell::new(mmsi),
            Cell::new(v.name.as_deref().unwrap_or("-")),
            Cell::new(flag_from_mmsi(*mmsi).unwrap_or("-")),
            Cell::new(v.ship_type.and_then(ship_type_text).unwrap_or("-")),
            Cell::new(v.lat.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(v.lon.map(|l| format!("{l:.4}")).unwrap_or("-".into())),
            Cell::new(v.sog.map(|s| format!("{s:.1}")).unwrap_or("-".into())),
            Cell::new(v.cog.map(|c| format!("{c:.1}")).unwrap_or("-".into())),
            Cell::new(v.messages),
        ]);
    }

    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ais_core::types::RawReport;

    #[test]
    fn test_parse_area() {
        let area = parse_area("-64,44.5,-63, 45").unwrap();
        assert_eq!(area, BoundingBox::new(-64.0, 44.5, -63.0, 45.0));
        assert!(parse_area("1,2,3").is_none());
        assert!(parse_area("a,b,c,d").is_none());
    }

    #[test]
    fn test_parse_time_arg() {
        assert_eq!(parse_time_arg("1625097600"), Some(1_625_097_600));
        assert_eq!(parse_time_arg("2021-07-01"), Some(1_625_097_600));
        assert_eq!(parse_time_arg("July"), None);
    }

    #[tokio::test]
    async fn test_collect_sink_keeps_track_vectors() {
        use ais_core::processor::{TrackPoint, TrackSegment};
        use ais_core::types::VesselMetadata;

        let vector = TrackVector {
            segment: TrackSegment {
                mmsi: 316001234,
                label: 0,
                index: 0,
                points: vec![TrackPoint {
                    time: 0,
                    lon: -63.5,
                    lat: 44.6,
                    sog: None,
                    cog: None,
                }],
            },
            metadata: VesselMetadata::bare(316001234),
            zones: Vec::new(),
        };
        let mut sink = CollectSink::default();
        sink.send(ServerMessage::TrackVector(vector.clone())).await.unwrap();
        sink.send(ServerMessage::done("Done. Count: 1")).await.unwrap();
        assert_eq!(sink.vectors, vec![vector]);
    }

    #[test]
    fn test_vessel_summary_keeps_latest() {
        let mut v = VesselSummary::default();
        let report = RawReport {
            mmsi: 316001234,
            timestamp: 0,
            lat: 44.6,
            lon: -63.5,
            sog: Some(10.0),
            cog: None,
            heading: None,
            rot: None,
            nav_status: None,
            msg_type: 1,
        };
        v.update(&AisMessage::Position(report.clone()));
        v.update(&AisMessage::Position(RawReport { sog: None, lat: 44.7, ..report }));
        assert_eq!(v.messages, 2);
        assert_eq!(v.lat, Some(44.7));
        assert_eq!(v.sog, Some(10.0));
    }
}
