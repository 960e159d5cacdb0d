fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vrb_core=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("kernel bench failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    use serde::Serialize;
    use std::hint::black_box;
    use std::path::PathBuf;
    use std::time::Instant;
    use tracing::info;
    use vrb_core::{
        engine::Passthrough,
        simd::{self, Kernels, SimdLevel},
        AudioRingBuffer, Profiler, StreamSession, TransportConfig,
    };

    #[derive(Debug)]
    struct Args {
        iterations: usize,
        block: usize,
        output: Option<PathBuf>,
    }

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct KernelResult {
        level: SimdLevel,
        kernel: &'static str,
        p50_ns: f64,
        p95_ns: f64,
        samples_per_us: f64,
    }

    #[derive(Debug, Clone, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct RingResult {
        samples_moved: usize,
        samples_per_us: f64,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Summary {
        active_level: SimdLevel,
        iterations: usize,
        block: usize,
        kernels: Vec<KernelResult>,
        ring: RingResult,
        session: Vec<vrb_core::profiling::ProfileSample>,
        diagnostics: vrb_core::engine::DiagnosticsSnapshot,
    }

    fn parse_args() -> Result<Args, String> {
        let mut iterations: usize = 2_000;
        let mut block: usize = 512;
        let mut output: Option<PathBuf> = None;

        let mut it = std::env::args().skip(1);
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "--iterations" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --iterations".into());
                    };
                    iterations = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --iterations".to_string())?
                        .clamp(1, 1_000_000);
                }
                "--block" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --block".into());
                    };
                    block = v
                        .parse::<usize>()
                        .map_err(|_| "invalid value for --block".to_string())?
                        .clamp(1, 1 << 16);
                }
                "--output" => {
                    let Some(v) = it.next() else {
                        return Err("missing value for --output".into());
                    };
                    output = Some(PathBuf::from(v));
                }
                "--help" | "-h" => {
                    println!(
                        "Usage: cargo run -p vrb-core --release --bin kernel-bench -- \\
  [--iterations <n>] [--block <frames>] [--output <file.json>]"
                    );
                    std::process::exit(0);
                }
                other => {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }

        Ok(Args {
            iterations,
            block,
            output,
        })
    }

    fn percentile(values: &[f64], p: f64) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((sorted.len() - 1) as f64 * p.clamp(0.0, 1.0)).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn time_kernel(
        kernels: &Kernels,
        name: &'static str,
        iterations: usize,
        block: usize,
        mut body: impl FnMut(&Kernels),
    ) -> KernelResult {
        let mut timings = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            let start = Instant::now();
            body(kernels);
            timings.push(start.elapsed().as_nanos() as f64);
        }
        let p50_ns = percentile(&timings, 0.50);
        KernelResult {
            level: kernels.level,
            kernel: name,
            p50_ns,
            p95_ns: percentile(&timings, 0.95),
            samples_per_us: if p50_ns > 0.0 {
                block as f64 / (p50_ns / 1_000.0)
            } else {
                0.0
            },
        }
    }

    let args = parse_args()?;
    let n = args.block;
    let signal: Vec<f32> = (0..n).map(|i| (i as f32 * 0.031).sin() * 0.7).collect();
    let mut work = signal.clone();
    let mut stereo = vec![0.0f32; n * 2];

    let mut kernels = Vec::new();
    for level in SimdLevel::ALL {
        let Some(k) = simd::kernels_for(level) else {
            continue;
        };
        info!(level = level.name(), "benchmarking kernels");
        kernels.push(time_kernel(k, "rms", args.iterations, n, |k| {
            black_box((k.rms)(black_box(&signal)));
        }));
        kernels.push(time_kernel(k, "peak", args.iterations, n, |k| {
            black_box((k.peak)(black_box(&signal)));
        }));
        kernels.push(time_kernel(k, "mix", args.iterations, n, |k| {
            (k.mix)(&mut work, &signal, 0.5);
        }));
        kernels.push(time_kernel(k, "copy", args.iterations, n, |k| {
            (k.copy)(&mut work, &signal);
        }));
        kernels.push(time_kernel(k, "gain_ramp", args.iterations, n, |k| {
            (k.gain_ramp)(&mut work, 1.0, 0.5);
        }));
        kernels.push(time_kernel(k, "interleave", args.iterations, n, |k| {
            (k.interleave)(&mut stereo, &signal, &signal);
        }));
    }

    // Ring throughput: one block in, one block out, single thread.
    let mut ring = AudioRingBuffer::with_frames(n * 4).map_err(|e| e.to_string())?;
    let (mut left, mut right) = (vec![0.0f32; n], vec![0.0f32; n]);
    let start = Instant::now();
    let mut moved = 0;
    for _ in 0..args.iterations {
        ring.write_stereo(&signal, &signal);
        moved += ring.read_stereo(&mut left, &mut right) * 2;
    }
    let elapsed_us = start.elapsed().as_secs_f64() * 1e6;
    let ring_result = RingResult {
        samples_moved: moved,
        samples_per_us: if elapsed_us > 0.0 {
            moved as f64 / elapsed_us
        } else {
            0.0
        },
    };

    // Full session path with the passthrough spatializer.
    let config = TransportConfig {
        block_frames: n,
        ..Default::default()
    };
    let (mut input, mut processor, mut output) =
        StreamSession::new(config).map_err(|e| e.to_string())?.split();
    let profiler = Profiler::new();
    processor.attach_profiler(&profiler);
    let diagnostics = processor.diagnostics();
    for _ in 0..args.iterations {
        input.push(&signal, &signal);
        processor.process_available(&mut Passthrough);
        output.pull(&mut left, &mut right);
    }

    let summary = Summary {
        active_level: simd::active_level(),
        iterations: args.iterations,
        block: n,
        kernels,
        ring: ring_result,
        session: profiler.report(),
        diagnostics: diagnostics.snapshot(),
    };

    println!(
        "Done. level={} kernels={} ring={:.1} samples/us",
        summary.active_level.name(),
        summary.kernels.len(),
        summary.ring.samples_per_us
    );

    let json = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    if let Some(out) = args.output {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }
        std::fs::write(&out, json).map_err(|e| e.to_string())?;
        println!("Wrote kernel bench report: {}", out.display());
    } else {
        println!("{json}");
    }

    Ok(())
}
