use clap::Parser;
use netscry_core::{OutputFormat, QueryRequest};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "netscry")]
#[command(about = "netscry - one query across every internet asset search engine")]
#[command(version)]
#[command(after_help = "\x1b[1;36mQuick Start:\x1b[0m
  netscry -q 1.1.1.1                          Free lookup via the default engine
  netscry --shodan 'title:\"Grafana\"'          Query one engine directly
  netscry -q 'ssl:\"example.com\"' -e shodan,censys
                                              One query, several engines
  netscry --fofa 'app=Grafana' -j -o out.json JSON lines to a file

\x1b[1;36mCredentials:\x1b[0m
  Engines read secrets from the provider config file, one list per engine:
      shodan: [SHODAN_TOKEN]
      google: [API_KEY, SEARCH_ENGINE_ID]
  Default location: ~/.config/netscry/provider-config.yaml")]
pub struct Cli {
    /// Query for the unscoped engines (all configured engines, or the free
    /// default engine when none are configured)
    #[arg(short = 'q', long = "query", value_name = "QUERY")]
    pub query: Option<String>,

    /// Engines to direct -q at (comma separated)
    #[arg(short = 'e', long = "engine", value_name = "ENGINES", value_delimiter = ',')]
    pub engine: Vec<String>,

    /// Shodan query
    #[arg(long, value_name = "QUERY")]
    pub shodan: Option<String>,

    /// Shodan InternetDB lookup (no credentials needed)
    #[arg(long = "shodan-idb", value_name = "IP")]
    pub shodan_idb: Option<String>,

    /// Censys query
    #[arg(long, value_name = "QUERY")]
    pub censys: Option<String>,

    /// Fofa query
    #[arg(long, value_name = "QUERY")]
    pub fofa: Option<String>,

    /// ZoomEye query
    #[arg(long, value_name = "QUERY")]
    pub zoomeye: Option<String>,

    /// Quake query
    #[arg(long, value_name = "QUERY")]
    pub quake: Option<String>,

    /// Netlas query
    #[arg(long, value_name = "QUERY")]
    pub netlas: Option<String>,

    /// CriminalIP query
    #[arg(long, value_name = "QUERY")]
    pub criminalip: Option<String>,

    /// Hunter.how query
    #[arg(long, value_name = "QUERY")]
    pub hunterhow: Option<String>,

    /// Google Custom Search query
    #[arg(long, value_name = "QUERY")]
    pub google: Option<String>,

    /// Odin query
    #[arg(long, value_name = "QUERY")]
    pub odin: Option<String>,

    /// BinaryEdge query
    #[arg(long, value_name = "QUERY")]
    pub binaryedge: Option<String>,

    /// Onyphe query
    #[arg(long, value_name = "QUERY")]
    pub onyphe: Option<String>,

    /// Emit one JSON object per result
    #[arg(short = 'j', long = "json")]
    pub json: bool,

    /// Emit raw host:port lines (default)
    #[arg(short = 'r', long = "raw", conflicts_with = "json")]
    pub raw: bool,

    /// Suppress banner and progress output, results only
    #[arg(long)]
    pub silent: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Stop after this many results across all engines
    #[arg(short = 'l', long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Write results to a file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Provider credential config (YAML)
    #[arg(long = "provider-config", value_name = "FILE", env = "NETSCRY_PROVIDER_CONFIG")]
    pub provider_config: Option<PathBuf>,

    /// Per-engine request rate (requests per second)
    #[arg(long = "rate-limit", value_name = "RPS", default_value_t = 1)]
    pub rate_limit: u32,

    /// Retry attempts per page
    #[arg(long, value_name = "COUNT", default_value_t = 3)]
    pub retries: u32,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,
}

impl Cli {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::HostPort
        }
    }

    /// Expand the flag surface into engine requests.
    ///
    /// Each provider flag contributes its provider to the request carrying
    /// that query; flags sharing a query string share a request (and with
    /// it a dedup scope). `-q` contributes the engines named by `-e`, or an
    /// unscoped request resolved by the engine itself.
    pub fn plan(&self) -> Vec<QueryRequest> {
        let format = self.format();
        let mut requests: Vec<QueryRequest> = Vec::new();

        let mut push = |query: &str, providers: Vec<String>| {
            if let Some(existing) = requests.iter_mut().find(|r| r.query == query) {
                existing.providers.extend(providers);
                return;
            }
            let mut request = QueryRequest::new(query).with_providers(providers);
            request.limit = self.limit;
            request.format = format;
            requests.push(request);
        };

        for (name, value) in [
            ("shodan", &self.shodan),
            ("shodan-idb", &self.shodan_idb),
            ("censys", &self.censys),
            ("fofa", &self.fofa),
            ("zoomeye", &self.zoomeye),
            ("quake", &self.quake),
            ("netlas", &self.netlas),
            ("criminalip", &self.criminalip),
            ("hunterhow", &self.hunterhow),
            ("google", &self.google),
            ("odin", &self.odin),
            ("binaryedge", &self.binaryedge),
            ("onyphe", &self.onyphe),
        ] {
            if let Some(query) = value {
                push(query, vec![name.to_string()]);
            }
        }

        if let Some(query) = &self.query {
            push(query, self.engine.clone());
        }

        requests
    }
}
