use clap::{arg_enum, AppSettings};
use kvs_cache::*;
use log::LevelFilter;
use log::{error, info, warn};
use std::env::current_dir;
use std::fs;
use std::process::exit;
use structopt::StructOpt;

const DEFAULT_ENGINE: Engine = Engine::kvs;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "kvs-cache",
    raw(global_settings = "&[\
                           AppSettings::DisableHelpSubcommand,\
                           AppSettings::VersionlessSubcommands]")
)]
struct Opt {
    #[structopt(
        long,
        help = "Sets the storage engine",
        value_name = "ENGINE-NAME",
        raw(possible_values = "&Engine::variants()")
    )]
    engine: Option<Engine>,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    #[structopt(name = "store", about = "Store a value under a new key and print the key")]
    Store {
        #[structopt(name = "VALUE", help = "The value to store")]
        value: String,
        #[structopt(long, help = "Stores the value as an integer", conflicts_with = "float")]
        int: bool,
        #[structopt(long, help = "Stores the value as a float")]
        float: bool,
    },
    #[structopt(name = "get", about = "Get the value of a given key")]
    Get {
        #[structopt(name = "KEY", help = "A key returned by store")]
        key: String,
        #[structopt(long, help = "Converts the value to an integer")]
        int: bool,
    },
    #[structopt(name = "replay", about = "Print the recorded calls of an operation")]
    Replay {
        #[structopt(
            name = "NAME",
            help = "The operation identity",
            raw(default_value = "STORE_QUALNAME")
        )]
        name: String,
    },
    #[structopt(name = "flush", about = "Remove every key")]
    Flush,
}

arg_enum! {
    #[allow(non_camel_case_types)]
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    enum Engine {
        kvs,
        sled
    }
}

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();
    let mut opt = Opt::from_args();
    let res = current_engine().and_then(move |curr_engine| {
        if opt.engine.is_none() {
            opt.engine = curr_engine;
        }
        if curr_engine.is_some() && opt.engine != curr_engine {
            error!("Wrong engine!");
            exit(1);
        }
        run(opt)
    });
    if let Err(e) = res {
        error!("{}", e);
        exit(1);
    }
}

fn run(opt: Opt) -> Result<()> {
    let engine = opt.engine.unwrap_or(DEFAULT_ENGINE);
    info!("kvs-cache {}", env!("CARGO_PKG_VERSION"));
    info!("Storage engine: {}", engine);

    // write engine to engine file
    fs::write(current_dir()?.join("engine"), format!("{}", engine))?;

    match engine {
        Engine::kvs => run_with(KvStore::open(current_dir()?)?, opt.command),
        Engine::sled => run_with(
            SledKvsEngine::new(sled::open(current_dir()?)?),
            opt.command,
        ),
    }
}

fn run_with<E: KvsEngine>(engine: E, command: Command) -> Result<()> {
    // history has to survive between invocations, so never flush on open
    let cache = Cache::attach(engine);
    match command {
        Command::Store { value, int, float } => {
            let value = if int {
                Value::Int(value.parse()?)
            } else if float {
                Value::Float(
                    value
                        .parse()
                        .map_err(|e| KvsError::StringError(format!("{}", e)))?,
                )
            } else {
                Value::Str(value)
            };
            println!("{}", cache.store(value)?);
        }
        Command::Get { key, int } => {
            let value = if int {
                cache.get_int(&key)?.map(|i| i.to_string())
            } else {
                cache.get(&key)?.map(|v| v.to_string())
            };
            match value {
                Some(value) => println!("{}", value),
                None => println!("Key not found"),
            }
        }
        Command::Replay { name } => {
            for line in cache.replay(&name)?.lines() {
                println!("{}", line);
            }
        }
        Command::Flush => cache.engine().flushdb()?,
    }
    Ok(())
}

fn current_engine() -> Result<Option<Engine>> {
    let engine = current_dir()?.join("engine");
    if !engine.exists() {
        return Ok(None);
    }

    match fs::read_to_string(engine)?.parse() {
        Ok(engine) => Ok(Some(engine)),
        Err(e) => {
            warn!("The content of engine file is invalid: {}", e);
            Ok(None)
        }
    }
}
