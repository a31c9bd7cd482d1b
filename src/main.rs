use std::io::Read;
use std::path::PathBuf;

use clap::Parser;

use bashpp::compiler::{CompileOptions, Compiler, DEFAULT_STDLIB_PATH};
use bashpp::entity::BashVersion;

#[derive(Parser)]
#[command(name = "bpp")]
#[command(about = "Bash++: Bash with classes")]
#[command(version)]
struct Cli {
    /// Output file; '-' writes to stdout. When absent, the compiled
    /// program runs on exit
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Add a directory to the include search path (repeatable)
    #[arg(short = 'I', long = "include")]
    include: Vec<String>,

    /// Suppress warnings
    #[arg(short = 's', long = "no-warnings")]
    no_warnings: bool,

    /// Display the parse tree and exit (do not compile)
    #[arg(short = 'p', long = "parse-tree")]
    parse_tree: bool,

    /// Display the token stream and exit (do not compile)
    #[arg(short = 't', long = "tokens")]
    tokens: bool,

    /// Target Bash version (MAJOR.MINOR)
    #[arg(short = 'b', long = "target-bash", default_value = "5.2")]
    target_bash: String,

    /// Source file to compile; reads stdin when absent
    #[arg()]
    file: Option<String>,

    /// Arguments passed to the compiled program when it runs on exit
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    program_args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let target_bash: BashVersion = match cli.target_bash.parse() {
        Ok(version) => version,
        Err(message) => {
            eprintln!("bpp: error: {message}");
            std::process::exit(1);
        }
    };

    // User include paths first, the system stdlib last
    let mut include_paths = Vec::new();
    for dir in &cli.include {
        let path = PathBuf::from(dir);
        if !path.is_dir() {
            eprintln!("bpp: error: include path '{dir}' does not exist or is not a directory");
            std::process::exit(1);
        }
        include_paths.push(path);
    }
    include_paths.push(PathBuf::from(DEFAULT_STDLIB_PATH));

    // Determine source: file or stdin
    let (source, source_file) = match &cli.file {
        Some(file) => match std::fs::read_to_string(file) {
            Ok(content) => (content, file.clone()),
            Err(e) => {
                eprintln!("bpp: error: cannot read '{file}': {e}");
                std::process::exit(1);
            }
        },
        None => {
            use std::io::IsTerminal;
            if std::io::stdin().is_terminal() {
                eprintln!("bpp: error: no input file. Provide a file or pipe a program via stdin.");
                std::process::exit(1);
            }
            let mut buffer = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buffer) {
                eprintln!("bpp: error: cannot read stdin: {e}");
                std::process::exit(1);
            }
            (buffer, "<stdin>".to_string())
        }
    };

    if cli.tokens {
        match bashpp::tokenize(&source) {
            Ok(tokens) => {
                println!("{}", serde_json::to_string_pretty(&tokens).expect("tokens serialize"));
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("{source_file}: {e}");
                std::process::exit(1);
            }
        }
    }

    if cli.parse_tree {
        let (script, errors) = bashpp::parse(&source);
        for error in &errors {
            eprintln!("{source_file}: {error}");
        }
        println!("{}", serde_json::to_string_pretty(&script).expect("AST serializes"));
        std::process::exit(if errors.is_empty() { 0 } else { 1 });
    }

    let compiler = Compiler::new(CompileOptions {
        include_paths,
        suppress_warnings: cli.no_warnings,
        target_bash,
    });

    let result = match compiler.compile_source(&source, &source_file) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("bpp: error: {e}");
            std::process::exit(1);
        }
    };

    for diagnostic in &result.diagnostics {
        eprintln!("{diagnostic}");
    }
    if !result.success {
        std::process::exit(1);
    }

    match cli.output.as_deref() {
        Some("-") => {
            print!("{}", result.output);
        }
        Some(path) => {
            if let Err(e) = std::fs::write(path, &result.output) {
                eprintln!("bpp: error: cannot write '{path}': {e}");
                std::process::exit(1);
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755));
            }
        }
        None => {
            // Compile-then-run: the target script's exit status is ours
            let status = run_compiled(&result.output, &cli.program_args);
            std::process::exit(status);
        }
    }
}

fn run_compiled(output: &str, args: &[String]) -> i32 {
    let mut path = std::env::temp_dir();
    path.push(format!("bpp_run_{}.sh", std::process::id()));
    if let Err(e) = std::fs::write(&path, output) {
        eprintln!("bpp: error: cannot write temporary script: {e}");
        return 1;
    }

    let status = std::process::Command::new("bash").arg(&path).args(args).status();
    let _ = std::fs::remove_file(&path);

    match status {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            eprintln!("bpp: error: cannot run bash: {e}");
            1
        }
    }
}
