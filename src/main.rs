use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use riptide::runtime::ComputeRuntime;
use riptide::{Backend, CompiledBundle};

#[derive(Parser)]
#[command(
    name = "riptide",
    version,
    about = "riptide compiler — one kernel source, every GPU backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a .rk kernel to shader text or a bundle
    Build {
        /// Input .rk kernel file
        input: PathBuf,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Backend to print shader text for (native or texture)
        #[arg(long)]
        backend: Option<String>,
        /// Emit the full bundle as JSON instead of one backend's shader
        #[arg(long)]
        bundle: bool,
    },
    /// Compile without emitting anything
    Check {
        /// Input .rk kernel file
        input: PathBuf,
    },
    /// Compile, bind inline data, execute, and print the output
    Run {
        /// Input .rk kernel file
        input: PathBuf,
        /// Bindings as name=v1,v2,... (repeatable)
        #[arg(long = "bind", value_name = "NAME=FLOATS")]
        bindings: Vec<String>,
        /// Workgroup count as x,y,z (default: the kernel's @dispatch)
        #[arg(long)]
        dispatch: Option<String>,
        /// Number of dispatches (ping-pong for in-place kernels)
        #[arg(long, default_value = "1")]
        iterations: u32,
        /// Force a backend (native or texture) instead of detection
        #[arg(long)]
        backend: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match cli.command {
        Command::Build {
            input,
            output,
            backend,
            bundle,
        } => build(&input, output.as_deref(), backend.as_deref(), bundle),
        Command::Check { input } => check(&input),
        Command::Run {
            input,
            bindings,
            dispatch,
            iterations,
            backend,
        } => run(&input, &bindings, dispatch.as_deref(), iterations, backend.as_deref()),
    };
    process::exit(code);
}

fn parse_backend(name: &str) -> Option<Backend> {
    match name {
        "native" => Some(Backend::Native),
        "texture" => Some(Backend::Texture),
        _ => {
            eprintln!("unknown backend '{}'; expected native or texture", name);
            None
        }
    }
}

fn compile_file(input: &std::path::Path) -> Result<(CompiledBundle, String), i32> {
    let source = std::fs::read_to_string(input).map_err(|e| {
        eprintln!("cannot read {}: {}", input.display(), e);
        1
    })?;
    let filename = input.display().to_string();
    let bundle = riptide::compile_with_diagnostics(&source, &filename).map_err(|_| 1)?;
    for warning in &bundle.warnings {
        eprintln!("warning: {}", warning);
    }
    Ok((bundle, filename))
}

fn build(
    input: &std::path::Path,
    output: Option<&std::path::Path>,
    backend: Option<&str>,
    emit_bundle: bool,
) -> i32 {
    let Ok((bundle, _)) = compile_file(input) else {
        return 1;
    };

    let text = if emit_bundle {
        match bundle.to_json() {
            Ok(json) => json,
            Err(e) => {
                eprintln!("cannot serialize bundle: {}", e);
                return 1;
            }
        }
    } else {
        let backend = match backend.map(parse_backend) {
            Some(Some(b)) => b,
            Some(None) => return 1,
            None => Backend::Native,
        };
        bundle.shader(backend).to_string()
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, text) {
                eprintln!("cannot write {}: {}", path.display(), e);
                return 1;
            }
        }
        None => print!("{}", text),
    }
    0
}

fn check(input: &std::path::Path) -> i32 {
    if compile_file(input).is_err() {
        return 1;
    }
    0
}

fn run(
    input: &std::path::Path,
    bindings: &[String],
    dispatch: Option<&str>,
    iterations: u32,
    backend: Option<&str>,
) -> i32 {
    let Ok((bundle, _)) = compile_file(input) else {
        return 1;
    };

    let runtime = match backend.map(parse_backend) {
        Some(Some(b)) => ComputeRuntime::with_backend(b),
        Some(None) => return 1,
        None => ComputeRuntime::new(),
    };
    let runtime = match runtime {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    let bundle = std::sync::Arc::new(bundle);
    let kernel = runtime.create_kernel(&bundle);

    for spec in bindings {
        let Some((name, values)) = spec.split_once('=') else {
            eprintln!("malformed --bind '{}'; expected name=v1,v2,...", spec);
            return 1;
        };
        let floats: Result<Vec<f32>, _> =
            values.split(',').map(|v| v.trim().parse::<f32>()).collect();
        let floats = match floats {
            Ok(f) => f,
            Err(e) => {
                eprintln!("malformed --bind '{}': {}", spec, e);
                return 1;
            }
        };
        let is_array = bundle
            .context
            .uniform(name)
            .map(|u| u.is_array)
            .unwrap_or(true);
        let result = if is_array || floats.len() > 1 {
            kernel.set_binding(name, floats)
        } else {
            kernel.set_binding(name, floats[0])
        };
        if let Err(e) = result {
            eprintln!("{}", e);
            return 1;
        }
    }

    if let Some(spec) = dispatch {
        let parts: Vec<u32> = spec
            .split(',')
            .filter_map(|v| v.trim().parse::<u32>().ok())
            .collect();
        if parts.len() != 3 {
            eprintln!("malformed --dispatch '{}'; expected x,y,z", spec);
            return 1;
        }
        kernel.set_dispatch(parts[0], parts[1], parts[2]);
    }

    let result = pollster::block_on(async {
        kernel.execute(iterations).await?;
        kernel.get_output().await
    });

    match result {
        Ok(values) => {
            let rendered: Vec<String> = values.iter().map(|v| format!("{}", v)).collect();
            println!("[{}]", rendered.join(", "));
            kernel.destroy();
            0
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}
