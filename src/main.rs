//! minigpu-emu: run kernels on the GPU core model

use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{bail, Context};
use minigpu_emu::config::Config;
use minigpu_emu::engine::Gpu;
use minigpu_emu::isa::image::{encode_program, read_image, write_words};
use minigpu_emu::isa::{assemble, Instruction};
use minigpu_emu::kernel::{builtin, KernelLaunch};

/// Built-in kernel selected with `--kernel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinKernel {
    VectorAdd,
    VectorAdd3,
}

impl BuiltinKernel {
    fn parse(name: &str) -> anyhow::Result<Self> {
        match name {
            "vadd" => Ok(Self::VectorAdd),
            "vadd3" => Ok(Self::VectorAdd3),
            other => bail!("unknown kernel '{}' (expected vadd or vadd3)", other),
        }
    }

    /// Input buffers the kernel reads.
    fn num_inputs(self) -> u32 {
        match self {
            Self::VectorAdd => 2,
            Self::VectorAdd3 => 3,
        }
    }

    /// Program with buffers laid out back to back, `n` words each.
    fn program(self, n: u32) -> anyhow::Result<Vec<Instruction>> {
        let base = |k: u32| -> anyhow::Result<u16> {
            u16::try_from(k * n).context("buffers do not fit the 16-bit CONST immediate")
        };
        Ok(match self {
            Self::VectorAdd => builtin::vector_add(base(0)?, base(1)?, base(2)?),
            Self::VectorAdd3 => builtin::vector_add3(base(0)?, base(1)?, base(2)?, base(3)?),
        })
    }
}

struct Options {
    kernel: BuiltinKernel,
    program_path: Option<String>,
    threads: u32,
    block_dim: u32,
    cores: Option<usize>,
    simds: Option<usize>,
    max_cycles: Option<u64>,
    trace: bool,
    dump: Option<(u32, usize)>,
    emit_bin: Option<String>,
    sample_config: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            kernel: BuiltinKernel::VectorAdd,
            program_path: None,
            threads: 64,
            block_dim: 32,
            cores: None,
            simds: None,
            max_cycles: None,
            trace: false,
            dump: None,
            emit_bin: None,
            sample_config: false,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    let opts = parse_args(&args[1..])?;

    if opts.sample_config {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let program = load_program(&opts)?;

    if let Some(path) = &opts.emit_bin {
        let file = File::create(path).with_context(|| format!("creating {}", path))?;
        write_words(BufWriter::new(file), &program)?;
        println!("Wrote {} words to {}", program.len(), path);
        return Ok(());
    }

    run(&opts, &program)
}

fn run(opts: &Options, program: &[u32]) -> anyhow::Result<()> {
    let mut config = Config::get().gpu_config();
    if let Some(cores) = opts.cores {
        config.num_cores = cores;
    }
    if let Some(simds) = opts.simds {
        config.num_simds = simds;
    }
    let max_cycles = opts.max_cycles.unwrap_or(config.max_cycles);

    let builtin = opts.program_path.is_none().then_some(opts.kernel);
    if let Some(kernel) = builtin {
        let needed = (kernel.num_inputs() as usize + 1) * opts.threads as usize;
        config.data_memory_words = config.data_memory_words.max(needed);
    }
    config.program_memory_words = config.program_memory_words.max(program.len());

    let mut gpu = Gpu::with_flat_memory(config)?;
    gpu.program_memory_mut().write_slice(0, program);

    let n = opts.threads;
    if let Some(kernel) = builtin {
        // Input k holds (k + 1) * i
        for k in 0..kernel.num_inputs() {
            let values: Vec<u32> = (0..n).map(|i| (k + 1) * i).collect();
            gpu.data_memory_mut().write_slice(k * n, &values);
        }
    }

    gpu.launch(KernelLaunch::new(n, opts.block_dim)?);
    if opts.trace {
        gpu.events_mut().enable();
    }

    println!(
        "Running {} instructions: {} threads, block_dim {}, {} cores x {} SIMDs",
        program.len(),
        n,
        opts.block_dim,
        config.num_cores,
        config.num_simds
    );
    let summary = gpu.run(max_cycles);
    let stats = gpu.simd_stats();

    println!("Status:        {}", gpu.status_string());
    println!("Cycles:        {}", summary.cycles);
    println!("Blocks:        {}/{}", summary.blocks_done, gpu.block_dispatcher().num_blocks());
    println!("Instructions:  {}", stats.instructions);
    println!("Stall cycles:  {}", stats.stall_cycles);
    if stats.decode_errors > 0 {
        println!("Decode errors: {}", stats.decode_errors);
    }

    if opts.trace {
        println!();
        println!("Event trace:");
        for e in gpu.events().events() {
            println!("  [{:6}] {:?}", e.cycle, e.event);
        }
    }

    if let Some((from, len)) = opts.dump {
        println!();
        print!("{}", gpu.data_memory().hexdump(from, len));
    }

    if !summary.kernel_done {
        bail!("kernel did not finish within {} cycles", max_cycles);
    }

    if let Some(kernel) = builtin {
        let out = kernel.num_inputs() * n;
        let expected_scale: u32 = (1..=kernel.num_inputs()).sum();
        let mismatches = (0..n)
            .filter(|&i| gpu.data_memory().read_word(out + i) != Some(expected_scale * i))
            .count();
        if mismatches > 0 {
            bail!("{} of {} results are wrong", mismatches, n);
        }
        println!("Result check:  PASS ({} elements)", n);
    }

    Ok(())
}

/// Assemble or read the program given on the command line, or build the
/// selected built-in kernel. Image words are loaded as-is; words that do not
/// decode run as no-ops.
fn load_program(opts: &Options) -> anyhow::Result<Vec<u32>> {
    let Some(path) = &opts.program_path else {
        return Ok(encode_program(&opts.kernel.program(opts.threads)?));
    };

    let is_source = Path::new(path)
        .extension()
        .is_some_and(|ext| ext == "s" || ext == "asm");

    if is_source {
        let source = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
        Ok(encode_program(&assemble(&source)?))
    } else {
        let file = File::open(path).with_context(|| format!("opening {}", path))?;
        Ok(read_image(file)?)
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<Options> {
    let mut opts = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| -> anyhow::Result<String> {
            iter.next().cloned().with_context(|| format!("{} needs a value", name))
        };

        match arg.as_str() {
            "--kernel" => opts.kernel = BuiltinKernel::parse(&value(arg)?)?,
            "--threads" => opts.threads = parse_num(arg, &value(arg)?)?,
            "--block-dim" => opts.block_dim = parse_num(arg, &value(arg)?)?,
            "--cores" => opts.cores = Some(parse_num(arg, &value(arg)?)?),
            "--simds" => opts.simds = Some(parse_num(arg, &value(arg)?)?),
            "--max-cycles" => opts.max_cycles = Some(parse_num(arg, &value(arg)?)?),
            "--trace" => opts.trace = true,
            "--dump" => opts.dump = Some(parse_range(&value(arg)?)?),
            "--emit-bin" => opts.emit_bin = Some(value(arg)?),
            "--sample-config" => opts.sample_config = true,
            other if other.starts_with('-') => bail!("unknown option '{}'", other),
            path => opts.program_path = Some(path.to_string()),
        }
    }

    Ok(opts)
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: &str) -> anyhow::Result<T> {
    raw.parse().ok().with_context(|| format!("{}: '{}' is not a number", name, raw))
}

/// `FROM:LEN`
fn parse_range(raw: &str) -> anyhow::Result<(u32, usize)> {
    let (from, len) = raw.split_once(':').with_context(|| format!("--dump expects FROM:LEN, got '{}'", raw))?;
    Ok((parse_num("--dump", from)?, parse_num("--dump", len)?))
}

fn print_usage() {
    println!("minigpu-emu: miniature GPU core emulator");
    println!();
    println!("Usage: minigpu-emu [options] [program.s|program.bin]");
    println!();
    println!("Without a program the built-in kernel is run and its result checked.");
    println!();
    println!("Options:");
    println!("  --kernel vadd|vadd3   Built-in kernel (default vadd)");
    println!("  --threads N           Threads to launch (default 64)");
    println!("  --block-dim N         Threads per block (default 32)");
    println!("  --cores N             Compute units");
    println!("  --simds N             SIMD engines per compute unit");
    println!("  --max-cycles N        Cycle budget");
    println!("  --trace               Print the scheduler event trace");
    println!("  --dump FROM:LEN       Hex dump data memory after the run");
    println!("  --emit-bin PATH       Write the program image and exit");
    println!("  --sample-config       Print a sample config file");
}
