mod geo;
mod grid;
mod processors;

use clap::Parser;
use gtfs_feed::{FeedReader, FeedWriter};
use processors::*;

/// Tidy, shrink and normalize GTFS schedule feeds
#[derive(Parser, Debug)]
#[command(name = "feedslim", version, about)]
struct Args {
    /// GTFS input, a directory or zip file
    input: String,

    /// Output directory, or zip file when the path ends with .zip
    #[arg(short, long, default_value = "gtfs-out")]
    output: String,

    /// Fall back to default values for non-required fields with errors
    #[arg(short = 'e', long = "default-on-errs")]
    default_on_errs: bool,

    /// Drop erroneous entries from the feed
    #[arg(short = 'D', long = "drop-errs")]
    drop_errs: bool,

    /// Check for stops at (0, 0)
    #[arg(short = 'n', long = "check-null-coords")]
    check_null_coords: bool,

    /// Replacement for empty required string fields (stop_name, agency_name, ...)
    #[arg(short = 'p', long = "empty-str-repl")]
    empty_str_repl: Option<String>,

    /// Remove entities that are not referenced anywhere
    #[arg(short = 'O', long = "delete-orphans")]
    delete_orphans: bool,

    /// Remeasure shapes, filling measurement holes
    #[arg(short = 'm', long = "remeasure-shapes")]
    remeasure_shapes: bool,

    /// Snap stop times without measurements onto the trip's shape
    #[arg(long = "remeasure-stop-times")]
    remeasure_stop_times: bool,

    /// Minimize shapes using Douglas-Peucker
    #[arg(short = 's', long = "min-shapes")]
    min_shapes: bool,

    /// Remove shape duplicates
    #[arg(short = 'S', long = "remove-red-shapes")]
    remove_red_shapes: bool,

    /// Remove route duplicates
    #[arg(short = 'R', long = "remove-red-routes")]
    remove_red_routes: bool,

    /// Remove duplicate services in calendar.txt and calendar_dates.txt
    #[arg(short = 'C', long = "remove-red-services")]
    remove_red_services: bool,

    /// Minimize services by searching for the optimal exception/range coverage
    #[arg(short = 'c', long = "minimize-services")]
    minimize_services: bool,

    /// Remove stop duplicates
    #[arg(short = 'P', long = "remove-red-stops")]
    remove_red_stops: bool,

    /// Relax attribute matching for stop duplicate removal
    #[arg(long = "red-stops-fuzzy")]
    red_stops_fuzzy: bool,

    /// Remove agency duplicates
    #[arg(short = 'A', long = "remove-red-agencies")]
    remove_red_agencies: bool,

    /// Recluster stops to unify platforms of the same logical station
    #[arg(short = 'E', long = "recluster-stops")]
    recluster_stops: bool,

    /// Remove trip duplicates
    #[arg(short = 'I', long = "remove-red-trips")]
    remove_red_trips: bool,

    /// Only check the method of transportation for trip duplicate removal
    #[arg(long = "red-trips-fuzzy")]
    red_trips_fuzzy: bool,

    /// Search for frequency patterns in explicit trips and combine them
    #[arg(short = 'T', long = "minimize-stoptimes")]
    minimize_stoptimes: bool,

    /// Smallest headway considered by the frequency search, in seconds
    #[arg(long = "min-headway", default_value_t = 60)]
    min_headway: u32,

    /// Largest headway considered by the frequency search, in seconds
    #[arg(long = "max-headway", default_value_t = 3600)]
    max_headway: u32,

    /// Minimize ids using numerical ids (144, 145, 146, ...)
    #[arg(short = 'i', long = "minimize-ids-num")]
    minimize_ids_num: bool,

    /// Minimize ids using dense character ids (abc, abd, abe, ...)
    #[arg(short = 'd', long = "minimize-ids-char")]
    minimize_ids_char: bool,

    #[arg(long = "keep-station-ids")]
    keep_station_ids: bool,
    #[arg(long = "keep-route-ids")]
    keep_route_ids: bool,
    #[arg(long = "keep-trip-ids")]
    keep_trip_ids: bool,
    #[arg(long = "keep-service-ids")]
    keep_service_ids: bool,
    #[arg(long = "keep-shape-ids")]
    keep_shape_ids: bool,
    #[arg(long = "keep-agency-ids")]
    keep_agency_ids: bool,
    #[arg(long = "keep-fare-ids")]
    keep_fare_ids: bool,
    #[arg(long = "keep-pathway-ids")]
    keep_pathway_ids: bool,
    #[arg(long = "keep-level-ids")]
    keep_level_ids: bool,

    /// Shorthand for -eDn -p '-'
    #[arg(long = "fix")]
    fix: bool,

    /// Shorthand for -OsSRCcIAP
    #[arg(long = "compress")]
    compress: bool,

    /// Like --compress, but additionally compress stop times into
    /// frequencies, use fuzzy matching for redundant trip removal and use
    /// dense character ids. The latter destroys any existing external
    /// references (like in GTFS realtime streams)
    #[arg(long = "Compress")]
    compress_hard: bool,

    /// Shorthand for -ARPICO
    #[arg(long = "merge")]
    merge: bool,

    /// Like --merge, plus stop reclustering and fuzzy trip matching
    #[arg(long = "Merge")]
    merge_fuzzy: bool,
}

impl Args {
    /// Composite shorthands expand to fixed flag sets; the runtime order of
    /// the processors is fixed regardless
    fn expand(&mut self) {
        if self.fix {
            self.default_on_errs = true;
            self.drop_errs = true;
            self.check_null_coords = true;
            if self.empty_str_repl.is_none() {
                self.empty_str_repl = Some("-".to_string());
            }
        }

        if self.merge_fuzzy {
            self.merge = true;
            self.red_trips_fuzzy = true;
            self.recluster_stops = true;
        }

        if self.merge {
            self.remove_red_services = true;
            self.remove_red_trips = true;
            self.remove_red_agencies = true;
            self.remove_red_stops = true;
            self.remove_red_routes = true;
            self.delete_orphans = true;
        }

        if self.compress_hard {
            self.compress = true;
            self.minimize_ids_char = true;
            self.minimize_stoptimes = true;
            self.red_trips_fuzzy = true;
        }

        if self.compress {
            self.delete_orphans = true;
            self.min_shapes = true;
            self.remove_red_shapes = true;
            self.remove_red_routes = true;
            self.remove_red_services = true;
            self.remove_red_stops = true;
            self.minimize_services = true;
            self.remove_red_trips = true;
            self.remove_red_agencies = true;
        }
    }

    /// The pipeline in its fixed execution order
    fn pipeline(&self) -> Vec<Box<dyn Processor>> {
        let mut processors: Vec<Box<dyn Processor>> = Vec::new();

        if self.delete_orphans {
            processors.push(Box::new(OrphanRemover {}));
        }
        if self.remeasure_shapes || self.min_shapes || self.remove_red_shapes {
            processors.push(Box::new(ShapeRemeasurer { force: false }));
        }
        if self.remeasure_stop_times {
            processors.push(Box::new(StopTimeRemeasurer {}));
        }
        if self.min_shapes {
            processors.push(Box::new(ShapeMinimizer { epsilon: 1.0 }));
        }
        if self.remove_red_shapes {
            processors.push(Box::new(ShapeDuplicateRemover { max_eq_dist: 10.0 }));
        }
        if self.remove_red_agencies {
            processors.push(Box::new(AgencyDuplicateRemover {}));
        }
        if self.remove_red_routes {
            processors.push(Box::new(RouteDuplicateRemover {}));
        }
        if self.remove_red_services {
            processors.push(Box::new(ServiceDuplicateRemover {}));
        }
        if self.minimize_services {
            processors.push(Box::new(ServiceMinimizer {}));
        }
        if self.remove_red_stops {
            processors.push(Box::new(if self.red_stops_fuzzy {
                StopDuplicateRemover::fuzzy()
            } else {
                StopDuplicateRemover::default()
            }));
        }
        if self.recluster_stops {
            processors.push(Box::new(StopReclusterer {
                dist_threshold: 75.0,
                name_threshold: 0.55,
            }));
        }
        if self.remove_red_trips {
            processors.push(Box::new(TripDuplicateRemover {
                fuzzy: self.red_trips_fuzzy,
                max_day_dist: 7,
            }));
            // trip removal may have orphaned routes and stops
            if self.delete_orphans {
                processors.push(Box::new(OrphanRemover {}));
            }
        }
        if self.minimize_stoptimes {
            processors.push(Box::new(FrequencyMinimizer {
                min_headway: self.min_headway,
                max_headway: self.max_headway,
            }));
        }
        if self.minimize_ids_num || self.minimize_ids_char {
            processors.push(Box::new(IdMinimizer {
                base: if self.minimize_ids_char { 36 } else { 10 },
                keep: KeepIds {
                    stops: self.keep_station_ids,
                    routes: self.keep_route_ids,
                    trips: self.keep_trip_ids,
                    services: self.keep_service_ids,
                    shapes: self.keep_shape_ids,
                    agencies: self.keep_agency_ids,
                    fares: self.keep_fare_ids,
                    pathways: self.keep_pathway_ids,
                    levels: self.keep_level_ids,
                },
            }));
        }

        processors
    }
}

fn main() {
    env_logger::init();

    let mut args = Args::parse();
    args.expand();

    print!("Parsing GTFS feed in '{}' ...", args.input);
    let mut feed = match FeedReader::default()
        .drop_erroneous(args.drop_errs)
        .default_on_error(args.default_on_errs)
        .check_null_coordinates(args.check_null_coords)
        .empty_string_replacement(args.empty_str_repl.clone())
        .read(&args.input)
    {
        Ok(feed) => feed,
        Err(e) => {
            eprintln!("\nError while parsing GTFS feed:");
            eprintln!("{}", e);
            eprintln!("\nYou may want to try running feedslim with --fix for error fixing / skipping. See --help for details.");
            std::process::exit(1);
        }
    };
    println!(" done.");

    for processor in args.pipeline() {
        processor.run(&mut feed);
    }

    print!("Outputting GTFS feed to '{}'...", args.output);
    if let Err(e) = FeedWriter::default().write(&feed, &args.output) {
        eprintln!("\nError while writing GTFS feed in '{}':", args.output);
        eprintln!("{}", e);
        std::process::exit(1);
    }
    println!(" done.");
}
