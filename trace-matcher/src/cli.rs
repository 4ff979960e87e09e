use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// TOML file overriding the default map-matching configuration
    #[arg(short, long, value_name = "*.toml")]
    pub config_file: Option<String>,

    /// CSV file of road network edges: columns edge_id, from, to, wkt_or_points
    #[arg(short, long, value_name = "*.csv")]
    pub edges_file: String,

    /// CSV file of raw trajectory fixes: columns trajectory_id, seq, x, y, timestamp
    #[arg(short, long, value_name = "*.csv")]
    pub trace_file: String,

    /// where matched output is written, as newline-delimited JSON
    #[arg(short, long, value_name = "*.jsonl")]
    pub output_file: String,
}
