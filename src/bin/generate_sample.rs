use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use run_scalars::data::event_log::EventWriter;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Shape of one synthetic run: how fast it learns and where it plateaus.
struct RunProfile {
    name: &'static str,
    decay: f64,
    final_acc: f64,
    log_top5: bool,
}

#[derive(Parser)]
#[command(name = "generate-sample")]
#[command(about = "Write three synthetic training runs as event logs")]
struct Args {
    /// Directory that receives one sub-directory per run
    #[arg(long, default_value = "sample_runs")]
    out_dir: PathBuf,

    /// Epochs per run
    #[arg(long, default_value_t = 30)]
    epochs: u64,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(42);

    let runs = [
        RunProfile { name: "baseline", decay: 0.10, final_acc: 0.71, log_top5: false },
        RunProfile { name: "kd", decay: 0.14, final_acc: 0.74, log_top5: true },
        RunProfile { name: "kd_t4", decay: 0.12, final_acc: 0.76, log_top5: true },
    ];
    let start_time = 1_700_000_000.0;

    for run in &runs {
        let run_dir = args.out_dir.join(run.name);
        let mut writer = EventWriter::create(&run_dir)
            .with_context(|| format!("creating event file in {}", run_dir.display()))?;

        for epoch in 0..args.epochs {
            let t = epoch as f64;
            let wall_time = start_time + t * 60.0;
            let progress = 1.0 - (-run.decay * t).exp();

            let train_loss = 2.3 * (1.0 - progress) + 0.05 + rng.gauss(0.0, 0.02);
            let test_loss = train_loss + 0.15 + rng.gauss(0.0, 0.03);
            let train_acc = (0.1 + (run.final_acc + 0.15 - 0.1) * progress + rng.gauss(0.0, 0.01)).min(1.0);
            let test_acc = (0.1 + (run.final_acc - 0.1) * progress + rng.gauss(0.0, 0.01)).min(1.0);

            let mut scalars = vec![
                ("train_loss", train_loss),
                ("train_acc", train_acc),
                ("test_loss", test_loss),
                ("test_acc", test_acc),
            ];
            if run.log_top5 {
                scalars.push(("test_acc_top5", (test_acc + 0.2).min(1.0)));
            }
            for (tag, value) in scalars {
                writer.add_scalar(tag, epoch, wall_time, value as f32)?;
            }
        }
        writer.flush()?;
        println!("Wrote {} epochs to {}", args.epochs, writer.path().display());
    }

    Ok(())
}
