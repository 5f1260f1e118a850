//! Synthetic shader host serving DAP.
//!
//! Spawns a handful of worker threads that "execute" a small virtual shader
//! line by line, so an IDE can connect, set breakpoints and step through it.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use log::info;

use shaderdap::dap::{DEFAULT_PORT, DapServer};
use shaderdap::debugger::{Constant, Context, File, Location, Slot};

const SHADER_NAME: &str = "demo.frag";
const SHADER_SOURCE: &str = "\
vec4 shade(vec2 uv) {
    float r = uv.x;
    float g = uv.y;
    float b = 0.5;
    return vec4(r, g, b, 1.0);
}

void main() {
    vec2 uv = gl_FragCoord.xy / resolution;
    fragColor = shade(uv);
}
";

// 1-based line numbers of the statements above, as reported to updates.
const SHADE_LINES: [i64; 4] = [2, 3, 4, 5];
const MAIN_LINES: [i64; 2] = [9, 10];

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on.
    #[clap(long, default_value_t = format!("127.0.0.1:{DEFAULT_PORT}"))]
    listen: String,

    /// Number of synthetic shader workers.
    #[clap(long, default_value_t = 2)]
    workers: u32,

    /// Milliseconds spent on each shader line.
    #[clap(long, default_value_t = 250)]
    line_millis: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let addr = args.listen.parse().context("invalid listen address")?;
    let ctx = Context::new();
    let server = DapServer::bind(Arc::clone(&ctx), addr)?;
    info!("serving DAP on {}", server.local_addr());

    let file = ctx.lock().create_virtual_file(SHADER_NAME, SHADER_SOURCE);

    info!("waiting for a debugger to finish configuration");
    while !server.wait_until_configured(Duration::from_secs(3600)) {}

    let workers: Vec<_> = (0..args.workers)
        .map(|lane| {
            let ctx = Arc::clone(&ctx);
            let file = Arc::clone(&file);
            let pace = Duration::from_millis(args.line_millis);
            thread::spawn(move || run_worker(&ctx, &file, lane, pace))
        })
        .collect();

    for worker in workers {
        let _ = worker.join();
    }
    Ok(())
}

fn run_worker(ctx: &Arc<Context>, file: &Arc<File>, lane: u32, pace: Duration) {
    let thread = ctx.current_thread();
    thread.set_name(&format!("lane.{lane}"));

    for frag in 0.. {
        let uv = (frag % 16) as f32 / 16.0;
        {
            let mut lock = ctx.lock();
            thread.enter(&mut lock, file, "main");
        }
        if let Some(locals) = thread.locals() {
            locals.put("uv", Arc::new(Slot::new(uv)));
        }
        if let Some(registers) = thread.registers() {
            registers.put("lane", Arc::new(Constant::new(lane)));
            registers.put("frag", Arc::new(Constant::new(frag)));
        }

        for line in MAIN_LINES {
            thread.update(Location::new(Arc::clone(file), line));
            thread::sleep(pace);
            if line == MAIN_LINES[0] {
                shade(ctx, file, &thread, uv, pace);
            }
        }
        thread.exit();
    }
}

fn shade(
    ctx: &Arc<Context>,
    file: &Arc<File>,
    thread: &Arc<shaderdap::debugger::Thread>,
    uv: f32,
    pace: Duration,
) {
    {
        let mut lock = ctx.lock();
        thread.enter(&mut lock, file, "shade");
    }
    if let Some(arguments) = thread.arguments() {
        arguments.put("uv", Arc::new(Constant::new(uv)));
    }
    for (step, line) in SHADE_LINES.into_iter().enumerate() {
        if let Some(locals) = thread.locals() {
            locals.put("step", Arc::new(Constant::new(step as u32)));
        }
        thread.update(Location::new(Arc::clone(file), line));
        thread::sleep(pace);
    }
    thread.exit();
}
