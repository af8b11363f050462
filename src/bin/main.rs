extern crate chrono;
extern crate clap;
extern crate env_logger;
extern crate tracker;

use clap::{App, Arg, ArgMatches, SubCommand};
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracker::asset_cache;
use tracker::asset_cache::search::{CacheQuery, ColumnQuery, PhraseQuery, QueryOperator};
use tracker::asset_cache::{fs_to_date_time, AssetFile, CacheDB};
use tracker::indexer::{AssetSource, Indexer};
use tracker::rcs::NullRevisionControl;
use tracker::resolver::{ManagedFile, Resolver};
use tracker::store::Store;
use tracker::tuid::{format_tuid, TuidGenerator};
use tracker::virtual_fs::{WrapperFS, FS};

fn main() {
    env_logger::init();

    let user_arg = Arg::with_name("user")
        .long("user")
        .short("u")
        .help("The user name recorded with this mutation.")
        .required(false)
        .takes_value(true)
        .default_value("unknown");

    let file_path_arg = Arg::with_name("FILE_PATH")
        .required(true)
        .index(1)
        .help("Path of the managed file");

    let init_cmd = SubCommand::with_name("init").about("creates the tracker database");
    let add_cmd = SubCommand::with_name("add")
        .about("registers a file, minting a new identifier for it")
        .arg(file_path_arg.clone())
        .arg(user_arg.clone());
    let move_cmd = SubCommand::with_name("move")
        .about("moves a registered file to a new path")
        .arg(
            Arg::with_name("FROM")
                .required(true)
                .index(1)
                .help("Current path of the managed file"),
        )
        .arg(
            Arg::with_name("TO")
                .required(true)
                .index(2)
                .help("New path of the managed file"),
        )
        .arg(user_arg.clone());
    let rm_cmd = SubCommand::with_name("rm")
        .about("soft-deletes a registered file")
        .arg(file_path_arg.clone())
        .arg(user_arg.clone());
    let history_cmd = SubCommand::with_name("history")
        .about("prints the mutation history of a registered file")
        .arg(file_path_arg.clone());
    let track_cmd = SubCommand::with_name("track")
        .about("re-indexes all registered files into the asset cache")
        .arg(user_arg.clone());
    let search_cmd = SubCommand::with_name("search")
        .about("searches the asset cache (PHRASE or column:PHRASE)")
        .arg(
            Arg::with_name("QUERY")
                .required(true)
                .index(1)
                .help("Search phrase, * acts as a wildcard"),
        );
    let deps_cmd = SubCommand::with_name("deps")
        .about("prints the dependency closure of a registered file")
        .arg(file_path_arg.clone())
        .arg(
            Arg::with_name("reverse")
                .long("reverse")
                .short("r")
                .help("Walk 'what needs this file' instead of 'what does it need'")
                .takes_value(false),
        )
        .arg(
            Arg::with_name("depth")
                .long("depth")
                .short("d")
                .help("Maximum traversal depth (0 = unbounded)")
                .takes_value(true)
                .default_value("0"),
        );
    let optimize_cmd = SubCommand::with_name("optimize")
        .about("optimizes the underlying SQLite database (can save space and speed up operations)");

    let store_path_arg = Arg::with_name("STORE_PATH")
        .required(true)
        .index(1)
        .help("Path of the tracker database file");
    let cli = App::new("AssetTracker")
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Tracks asset identities and dependencies in an embedded cache")
        .arg(store_path_arg)
        .subcommand(init_cmd)
        .subcommand(add_cmd)
        .subcommand(move_cmd)
        .subcommand(rm_cmd)
        .subcommand(history_cmd)
        .subcommand(track_cmd)
        .subcommand(search_cmd)
        .subcommand(deps_cmd)
        .subcommand(optimize_cmd)
        .get_matches();

    let store_path = cli.value_of("STORE_PATH").unwrap();
    if let Some(_init_cli) = cli.subcommand_matches("init") {
        init_store(store_path);
    } else if let Some(add_cli) = cli.subcommand_matches("add") {
        add_file(store_path, add_cli);
    } else if let Some(move_cli) = cli.subcommand_matches("move") {
        move_file(store_path, move_cli);
    } else if let Some(rm_cli) = cli.subcommand_matches("rm") {
        rm_file(store_path, rm_cli);
    } else if let Some(history_cli) = cli.subcommand_matches("history") {
        print_history(store_path, history_cli);
    } else if let Some(track_cli) = cli.subcommand_matches("track") {
        track_files(store_path, track_cli);
    } else if let Some(search_cli) = cli.subcommand_matches("search") {
        search_assets(store_path, search_cli);
    } else if let Some(deps_cli) = cli.subcommand_matches("deps") {
        print_deps(store_path, deps_cli);
    } else if let Some(_optimize_cli) = cli.subcommand_matches("optimize") {
        optimize_store(store_path);
    } else {
        println!("Please specify the command you want to perform on the tracker.");
        println!("See --help for more information.");
    }
}

fn open_store(store_path: &str) -> Arc<Store> {
    match Store::open(store_path) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("Could not open tracker database: {:?}", err);
            std::process::exit(1);
        }
    }
}

fn open_cache(store: &Arc<Store>) -> CacheDB<WrapperFS> {
    CacheDB::new(
        store.clone(),
        <WrapperFS as FS>::default(),
        Arc::new(NullRevisionControl),
    )
}

fn init_store(store_path: &str) {
    println!("Creating tracker database at '{}'...", store_path);
    open_store(store_path);
    println!("Done!");
}

fn add_file(store_path: &str, cmd_cli: &ArgMatches) {
    let file_path = cmd_cli.value_of("FILE_PATH").unwrap();
    let user = cmd_cli.value_of("user").unwrap();

    let fs = <WrapperFS as FS>::default();
    let metadata = match fs.metadata(file_path) {
        Ok(metadata) => metadata,
        Err(err) => {
            eprintln!("Could not stat '{}': {}", file_path, err);
            std::process::exit(1);
        }
    };
    let modified = fs_to_date_time(&metadata.last_mod_time());

    let resolver = Resolver::new(open_store(store_path));
    let user_id = resolver.user_id(user).unwrap();
    let minted = TuidGenerator::new().next();

    match resolver.insert(minted, file_path, modified, modified, user_id) {
        Ok(id) if id == minted => println!("Added '{}' as {}", file_path, format_tuid(id)),
        Ok(id) => println!(
            "'{}' was already tracked as {} (new id recorded as an alias)",
            file_path,
            format_tuid(id)
        ),
        Err(err) => eprintln!("{:?}", err),
    }
}

fn move_file(store_path: &str, cmd_cli: &ArgMatches) {
    let from = cmd_cli.value_of("FROM").unwrap();
    let to = cmd_cli.value_of("TO").unwrap();
    let user = cmd_cli.value_of("user").unwrap();

    let resolver = Resolver::new(open_store(store_path));
    let user_id = resolver.user_id(user).unwrap();

    let file = match resolver.find_by_path(from, false).unwrap() {
        Some(file) => file,
        None => {
            eprintln!("'{}' is not tracked!", from);
            std::process::exit(1);
        }
    };

    match resolver.update(file.file_id(), to, chrono_now(), user_id) {
        Ok(id) => println!("Moved '{}' -> '{}' ({})", from, to, format_tuid(id)),
        Err(err) => eprintln!("{:?}", err),
    }
}

fn rm_file(store_path: &str, cmd_cli: &ArgMatches) {
    let file_path = cmd_cli.value_of("FILE_PATH").unwrap();
    let user = cmd_cli.value_of("user").unwrap();

    let resolver = Resolver::new(open_store(store_path));
    let user_id = resolver.user_id(user).unwrap();

    match resolver.find_by_path(file_path, false).unwrap() {
        Some(file) => {
            resolver.mark_deleted(file.file_id(), user_id).unwrap();
            println!("Deleted '{}' ({})", file_path, format_tuid(file.file_id()));
        }
        None => {
            eprintln!("'{}' is not tracked!", file_path);
            std::process::exit(1);
        }
    }
}

fn print_history(store_path: &str, cmd_cli: &ArgMatches) {
    let file_path = cmd_cli.value_of("FILE_PATH").unwrap();

    let resolver = Resolver::new(open_store(store_path));
    let file = match resolver.find_by_path(file_path, true).unwrap() {
        Some(file) => file,
        None => {
            eprintln!("'{}' is not tracked!", file_path);
            std::process::exit(1);
        }
    };

    println!("History of '{}' ({}):", file_path, format_tuid(file.file_id()));
    for entry in resolver.history(file.file_id()).unwrap() {
        let user = resolver
            .username(entry.user_id as u32)
            .unwrap()
            .unwrap_or_else(|| entry.user_id.to_string());
        match entry.data {
            Some(data) => println!("  {} {} by {} ({})", entry.modified, entry.operation.name(), user, data),
            None => println!("  {} {} by {}", entry.modified, entry.operation.name(), user),
        }
    }
}

/// Source that describes assets from plain file metadata. Dependency
/// extraction belongs to the surrounding asset tooling, files added through
/// this CLI simply have no dependencies.
struct StatSource {
    fs: WrapperFS,
    user: String,
}

impl AssetSource for StatSource {
    fn load(&self, file: &ManagedFile) -> io::Result<AssetFile> {
        let metadata = self.fs.metadata(&file.path)?;

        let mut asset = AssetFile::new(file.file_id(), &file.path);
        asset.size = metadata.size();
        asset.rcs_user = self.user.clone();
        Ok(asset)
    }
}

fn track_files(store_path: &str, cmd_cli: &ArgMatches) {
    let user = cmd_cli.value_of("user").unwrap();

    let store = open_store(store_path);
    let cache = Arc::new(open_cache(&store));
    let resolver = Arc::new(Resolver::new(store));
    let source = Arc::new(StatSource {
        fs: <WrapperFS as FS>::default(),
        user: user.to_string(),
    });

    println!("Re-indexing all tracked files...");
    let mut indexer = Indexer::spawn(cache, resolver, source);
    indexer.wait();

    if indexer.did_fail() {
        eprintln!(
            "Index pass finished with failures ({}/{} files)",
            indexer.progress(),
            indexer.total()
        );
        std::process::exit(1);
    }
    println!(
        "Index pass complete ({}/{} files)",
        indexer.progress(),
        indexer.total()
    );
}

fn search_assets(store_path: &str, cmd_cli: &ArgMatches) {
    let raw_query = cmd_cli.value_of("QUERY").unwrap();

    let store = open_store(store_path);
    let cache = open_cache(&store);

    // PHRASE searches all generic columns, column:PHRASE scopes to one.
    let query = match raw_query.find(':') {
        Some(split) => {
            let (column_name, phrase) = raw_query.split_at(split);
            match asset_cache::search::find_column(cache.columns(), column_name) {
                Some(column) => CacheQuery::new(QueryOperator::And)
                    .add_column(ColumnQuery::like(column, &phrase[1..])),
                None => {
                    eprintln!("Unknown search column '{}'", column_name);
                    std::process::exit(1);
                }
            }
        }
        None => CacheQuery::new(QueryOperator::And).add_phrase(PhraseQuery::new(raw_query)),
    };

    let hits = cache.search_files(&query, &AtomicBool::new(false)).unwrap();
    for hit in &hits {
        println!("{} {}", format_tuid(hit.id), hit.path);
    }
    println!("{} matching assets", hits.len());
}

fn print_deps(store_path: &str, cmd_cli: &ArgMatches) {
    let file_path = cmd_cli.value_of("FILE_PATH").unwrap();
    let reverse = cmd_cli.is_present("reverse");
    let max_depth: u32 = cmd_cli
        .value_of("depth")
        .unwrap()
        .parse()
        .expect("--depth expects a number");

    let store = open_store(store_path);
    let cache = open_cache(&store);
    let resolver = Resolver::new(store);

    let file = match resolver.find_by_path(file_path, false).unwrap() {
        Some(file) => file,
        None => {
            eprintln!("'{}' is not tracked!", file_path);
            std::process::exit(1);
        }
    };

    let dependencies = cache
        .dependencies_of(file.file_id(), reverse, max_depth, &AtomicBool::new(false))
        .unwrap();
    for id in dependencies {
        if id == file.file_id() {
            continue;
        }
        match cache.asset_path(id).unwrap() {
            Some(path) => println!("{} {}", format_tuid(id), path),
            None => println!("{}", format_tuid(id)),
        }
    }
}

fn optimize_store(store_path: &str) {
    println!("Optimizing database file...");
    open_store(store_path).optimize().unwrap();
    println!("Optimization done!");
}

fn chrono_now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
