use clap::{Parser, Subcommand, ValueEnum};
use geo::{Coord, Rect};
use map_index_lib::ReaderStrategy;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(name = "map-index", author, version, about, long_about = None)]
/// Map Index - load map files, enumerate features and run interactive searches
pub struct Cli {
    /// JSON configuration file (overridden by MAP_INDEX_* variables and flags)
    #[clap(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// How map files are read while loading
    #[clap(short, long, value_enum, global = true)]
    pub strategy: Option<StrategyArg>,

    /// Fail loading maps that carry unknown type tags
    #[clap(long, global = true)]
    pub strict_types: bool,

    /// Only log warnings and errors (unless RUST_LOG is set)
    #[clap(long, global = true)]
    pub quiet: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Load maps and print what each contains
    Info {
        /// Map files to load
        #[clap(required = true, value_name = "MAP")]
        maps: Vec<PathBuf>,
    },

    /// Print every feature intersecting a rectangle
    Features {
        /// Map files to load
        #[clap(required = true, value_name = "MAP")]
        maps: Vec<PathBuf>,

        /// Query rectangle as minx,miny,maxx,maxy
        #[clap(
            long,
            value_parser = parse_rect,
            allow_hyphen_values = true,
            required_unless_present = "center",
            conflicts_with = "center"
        )]
        rect: Option<Rect<f64>>,

        /// Centre x,y of a square query area as large as one screen at --scale
        #[clap(long, value_parser = parse_point, allow_hyphen_values = true, requires = "scale")]
        center: Option<Coord<f64>>,

        /// Scale level (derived from the rectangle size when omitted)
        #[clap(long, value_parser = clap::value_parser!(u8).range(0..=17))]
        scale: Option<u8>,

        /// Deliver areas, then lines, then points
        #[clap(long, default_value = "false")]
        tile_drawing: bool,
    },

    /// Run an interactive search session and print its events
    Search {
        /// Map files to load
        #[clap(required = true, value_name = "MAP")]
        maps: Vec<PathBuf>,

        /// Text to search for
        #[clap(short, long)]
        query: String,

        /// Visible viewport as minx,miny,maxx,maxy
        #[clap(long, value_parser = parse_rect, allow_hyphen_values = true)]
        viewport: Rect<f64>,

        /// Preferred language of result names
        #[clap(long)]
        locale: Option<String>,

        /// Relevant viewport results needed to skip the everywhere search
        #[clap(long)]
        min_results: Option<usize>,

        /// Never widen the search beyond the viewport
        #[clap(long, default_value = "false")]
        no_fallback: bool,
    },

    /// Wrap a JSON feature document into a map file
    Pack {
        /// JSON document with a `features` array
        input: PathBuf,

        /// Map file to write
        output: PathBuf,

        /// Format version to write
        #[clap(long, default_value_t = map_index_lib::reader::CURRENT_VERSION)]
        format_version: u16,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    /// Read each file into memory first
    Buffered,
    /// Read ranges from the open file
    File,
}

impl From<StrategyArg> for ReaderStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Buffered => ReaderStrategy::Buffered,
            StrategyArg::File => ReaderStrategy::FileBacked,
        }
    }
}

/// Comma-separated finite numbers, exactly as many as `expected` names
fn parse_numbers<const N: usize>(s: &str, expected: &str) -> Result<[f64; N], String> {
    let values = s
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid number {v:?}: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let count = values.len();
    let values: [f64; N] = values
        .try_into()
        .map_err(|_| format!("expected {expected}, got {count} values"))?;
    if values.iter().any(|v| !v.is_finite()) {
        return Err("coordinates must be finite".to_string());
    }
    Ok(values)
}

/// Parse `minx,miny,maxx,maxy` into a rectangle
pub fn parse_rect(s: &str) -> Result<Rect<f64>, String> {
    let [min_x, min_y, max_x, max_y] = parse_numbers(s, "minx,miny,maxx,maxy")?;
    Ok(Rect::new(
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: max_y },
    ))
}

/// Parse `x,y` into a coordinate
pub fn parse_point(s: &str) -> Result<Coord<f64>, String> {
    let [x, y] = parse_numbers(s, "x,y")?;
    Ok(Coord { x, y })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rect() {
        let rect = parse_rect("-1.5, -1.5,-0.5,-0.5").unwrap();
        assert_eq!(rect.min(), Coord { x: -1.5, y: -1.5 });
        assert_eq!(rect.max(), Coord { x: -0.5, y: -0.5 });

        // Corners are normalized
        let flipped = parse_rect("1,1,0,0").unwrap();
        assert_eq!(flipped.min(), Coord { x: 0.0, y: 0.0 });

        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
        assert!(parse_rect("0,0,inf,1").is_err());
    }

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("-1.5, 2").unwrap(), Coord { x: -1.5, y: 2.0 });
        assert!(parse_point("1").is_err());
        assert!(parse_point("1,2,3").is_err());
        assert!(parse_point("nan,0").is_err());
    }

    #[test]
    fn test_features_area_arguments() {
        let parse = |args: &[&str]| {
            Cli::try_parse_from(["map-index", "features", "A.map"].iter().chain(args))
        };

        let cli = parse(&["--center", "-10,5", "--scale", "12"]).unwrap();
        match cli.command {
            Command::Features {
                rect, center, scale, ..
            } => {
                assert_eq!(rect, None);
                assert_eq!(center, Some(Coord { x: -10.0, y: 5.0 }));
                assert_eq!(scale, Some(12));
            }
            other => panic!("unexpected command {other:?}"),
        }

        // One of --rect / --center is required, not both; --center needs --scale
        assert!(parse(&[]).is_err());
        assert!(parse(&["--rect", "0,0,1,1", "--center", "0,0", "--scale", "3"]).is_err());
        assert!(parse(&["--center", "0,0"]).is_err());
    }

    #[test]
    fn test_parse_search_command() {
        let cli = Cli::try_parse_from([
            "map-index",
            "--strategy",
            "file",
            "search",
            "World.map",
            "--query",
            "cafe",
            "--viewport",
            "-1.5,-1.5,-0.5,-0.5",
            "--no-fallback",
        ])
        .unwrap();

        assert_eq!(cli.strategy, Some(StrategyArg::File));
        match cli.command {
            Command::Search {
                maps,
                query,
                no_fallback,
                min_results,
                ..
            } => {
                assert_eq!(maps, vec![PathBuf::from("World.map")]);
                assert_eq!(query, "cafe");
                assert!(no_fallback);
                assert_eq!(min_results, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_features_scale_range() {
        let parse = |scale: &str| {
            Cli::try_parse_from([
                "map-index",
                "features",
                "A.map",
                "--rect",
                "0,0,1,1",
                "--scale",
                scale,
            ])
        };
        assert!(parse("17").is_ok());
        assert!(parse("18").is_err());
    }

    #[test]
    fn test_maps_required() {
        assert!(Cli::try_parse_from(["map-index", "info"]).is_err());
    }

    #[test]
    fn test_strategy_conversion() {
        assert_eq!(
            ReaderStrategy::from(StrategyArg::File),
            ReaderStrategy::FileBacked
        );
        assert_eq!(
            ReaderStrategy::from(StrategyArg::Buffered),
            ReaderStrategy::Buffered
        );
    }
}
