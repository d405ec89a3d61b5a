use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use symdex_core::prelude::*;
use symdex_utils::{
    info, init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel, LoggingError,
};

/// Inspect and query the symbol tables of native binaries.
#[derive(Parser, Debug)]
#[command(name = "symdex")]
#[command(version)]
#[command(about = "Inspect and query the symbol tables of native binaries", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log format (pretty or json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
    /// Write logs to ~/.symdex instead of stderr
    #[arg(long, global = true, default_value_t = false)]
    log_to_file: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Print every symbol in an object file
    Dump
    {
        /// Path to the executable or shared library
        path: PathBuf,
        /// Order of the listing
        #[arg(long, value_enum, default_value_t = SortArg::None)]
        sort: SortArg,
        /// Address the image is loaded at (hex format: 0x1000 or decimal)
        #[arg(long)]
        load_address: Option<String>,
    },
    /// Find symbols by exact name or regular expression
    Lookup
    {
        path: PathBuf,
        /// Symbol name, or a pattern with --regex
        name: String,
        /// Only report symbols of this type
        #[arg(short = 't', long = "type", value_enum, default_value_t = TypeArg::Any)]
        symbol_type: TypeArg,
        /// Treat NAME as a regular expression
        #[arg(long, default_value_t = false)]
        regex: bool,
    },
    /// Show the symbols that contain a file address
    Address
    {
        path: PathBuf,
        /// File address (hex format: 0x1000 or decimal)
        address: String,
        /// List every containing symbol instead of the innermost one
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Find functions by full name, basename, method name or selector
    Functions
    {
        path: PathBuf,
        name: String,
        /// Match full names
        #[arg(long)]
        full: bool,
        /// Match function basenames
        #[arg(long)]
        base: bool,
        /// Match C++ method names
        #[arg(long)]
        method: bool,
        /// Match Objective-C selectors
        #[arg(long)]
        selector: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg
{
    None,
    Name,
    Address,
}

impl From<SortArg> for SortOrder
{
    fn from(sort: SortArg) -> Self
    {
        match sort {
            SortArg::None => SortOrder::None,
            SortArg::Name => SortOrder::ByName,
            SortArg::Address => SortOrder::ByAddress,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TypeArg
{
    Any,
    Code,
    Data,
    Resolver,
    Trampoline,
    Absolute,
    Runtime,
    ObjcClass,
    ReExported,
}

impl From<TypeArg> for SymbolType
{
    fn from(arg: TypeArg) -> Self
    {
        match arg {
            TypeArg::Any => SymbolType::Any,
            TypeArg::Code => SymbolType::Code,
            TypeArg::Data => SymbolType::Data,
            TypeArg::Resolver => SymbolType::Resolver,
            TypeArg::Trampoline => SymbolType::Trampoline,
            TypeArg::Absolute => SymbolType::Absolute,
            TypeArg::Runtime => SymbolType::Runtime,
            TypeArg::ObjcClass => SymbolType::ObjCClass,
            TypeArg::ReExported => SymbolType::ReExported,
        }
    }
}

fn main()
{
    let cli = Cli::parse();

    if let Err(e) = setup_logging(&cli) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn setup_logging(cli: &Cli) -> std::result::Result<(), LoggingError>
{
    if cli.log_to_file {
        let path = init_logging_to_file(cli.log_level, cli.log_format.unwrap_or_default())?;
        eprintln!("Logging to {}", path.display());
        return Ok(());
    }
    match (cli.log_level, cli.log_format) {
        (None, None) => init_logging(),
        (level, format) => init_logging_with_level(level.unwrap_or(LogLevel::Info), format.unwrap_or_default()),
    }
}

fn run_command(cli: Cli) -> Result<()>
{
    match cli.command {
        Commands::Dump {
            path,
            sort,
            load_address,
        } => {
            let load_address = load_address.as_deref().map(parse_address).transpose()?;
            let image = load_image(path, load_address.map(Address::value))?;
            let mut out = String::new();
            let result = if load_address.is_some() {
                let to_load = |addr: Address| image.load_address(addr);
                image.symtab().dump(&mut out, Some(&to_load), sort.into())
            } else {
                image.symtab().dump(&mut out, None, sort.into())
            };
            result.map_err(|_| SymdexError::InvalidArgument("failed to format symbol table".to_string()))?;
            print!("{out}");
            Ok(())
        }
        Commands::Lookup {
            path,
            name,
            symbol_type,
            regex,
        } => {
            let image = load_image(path, None)?;
            let symtab = image.symtab();
            let filter = SymbolFilter::of_type(symbol_type.into());
            let indexes = if regex {
                symtab.find_all_symbols_matching_regex_and_type(&name, filter)?
            } else {
                symtab.find_all_symbols_with_name_and_type(&name, filter)
            };
            if indexes.is_empty() {
                println!("No symbols match '{}'", name);
                return Ok(());
            }
            print_contexts(symtab, &symtab.symbol_indices_to_contexts(&indexes));
            Ok(())
        }
        Commands::Address { path, address, all } => {
            let address = parse_address(&address)?;
            let image = load_image(path, None)?;
            let symtab = image.symtab();
            if all {
                let mut found = Vec::new();
                symtab.for_each_symbol_containing_file_address(address, |index, symbol| {
                    found.push(SymbolContext {
                        index,
                        symbol: symbol.clone(),
                    });
                    true
                });
                if found.is_empty() {
                    println!("No symbol contains {}", address);
                } else {
                    print_contexts(symtab, &found);
                }
            } else {
                match symtab.find_symbol_containing_file_address(address) {
                    Some(symbol) => {
                        let offset = symbol
                            .file_address()
                            .map_or(0, |start| address.offset_from(start).unwrap_or(0));
                        println!("{} + {:#x}", display_name(symtab, &symbol), offset);
                    }
                    None => println!("No symbol contains {}", address),
                }
            }
            Ok(())
        }
        Commands::Functions {
            path,
            name,
            full,
            base,
            method,
            selector,
        } => {
            let mut mask = FunctionNameType::empty();
            mask.set(FunctionNameType::FULL, full);
            mask.set(FunctionNameType::BASE, base);
            mask.set(FunctionNameType::METHOD, method);
            mask.set(FunctionNameType::SELECTOR, selector);
            if mask.is_empty() {
                mask = FunctionNameType::ANY;
            }

            let image = load_image(path, None)?;
            let symtab = image.symtab();
            let contexts = symtab.find_function_symbols(&name, mask);
            if contexts.is_empty() {
                println!("No functions match '{}'", name);
            } else {
                print_contexts(symtab, &contexts);
            }
            Ok(())
        }
    }
}

fn load_image(path: PathBuf, load_address: Option<u64>) -> Result<ObjectImage>
{
    info!("Loading {}", path.display());
    let image = ObjectImage::parse(ImageDescriptor { path, load_address }, StringPool::shared())?;
    info!(
        "Loaded {} ({}, {} symbols)",
        image.path().display(),
        image.architecture(),
        image.symtab().num_symbols()
    );
    Ok(image)
}

fn print_contexts(symtab: &Symtab, contexts: &[SymbolContext])
{
    for context in contexts {
        let symbol = &context.symbol;
        let address = symbol
            .file_address()
            .map_or_else(|| "-".to_string(), |addr| addr.to_string());
        println!(
            "[{:>5}] {:<12} {} 0x{:08x} {}",
            context.index,
            symbol.symbol_type().as_str(),
            address,
            symbol.byte_size(),
            display_name(symtab, symbol)
        );
    }
}

fn display_name(symtab: &Symtab, symbol: &Symbol) -> String
{
    symtab
        .demangled_name(symbol)
        .or_else(|| symbol.name().map(|name| symtab.pool().resolve(name)))
        .map_or_else(|| "<anonymous>".to_string(), |name| name.to_string())
}

fn parse_address(text: &str) -> Result<Address>
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed
        .map(Address::new)
        .map_err(|_| SymdexError::InvalidArgument(format!("invalid address: {text}")))
}
