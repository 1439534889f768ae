//! Example: offline render of a click train through two synthetic IRs.
//!
//! Builds a small filter library (a dry tap and a decaying echo), binds one
//! worker per output channel, streams a click train through the engine
//! block by block, and writes the stereo result to a WAV file.
//!
//! Usage: cargo run --example render_demo -- [output.wav]

use resona_core::FadeSpec;
use resona_engine::ConvolverManager;

const BLOCK_SIZE: usize = 256;
const SAMPLE_RATE: u32 = 48_000;
const IR_LENGTH: usize = 2048;

fn main() {
    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "render_demo.wav".to_string());

    // IR 0: dry tap. IR 1: three decaying echoes.
    let mut irs = vec![0.0f32; 2 * IR_LENGTH];
    irs[0] = 1.0;
    let echo = &mut irs[IR_LENGTH..];
    echo[0] = 0.6;
    echo[700] = 0.35;
    echo[1500] = 0.18;

    let mut manager = ConvolverManager::new(BLOCK_SIZE);
    manager.create_irs(&irs, 2, IR_LENGTH, &FadeSpec::NONE);
    manager.set_worker_count(2);
    manager.select_ir(0, 0, 0.8, 0.0);
    // Right channel: the echo IR, slightly attenuated and delayed for width.
    manager.select_ir(1, 1, 0.7, 18.5);

    println!(
        "{} IRs, {} partitions, {} samples buffered",
        manager.num_irs(),
        manager.partitions(),
        manager.samples_buffered()
    );

    // About a second of input, whole blocks only: a click every 12000
    // samples.
    let frames = (SAMPLE_RATE as usize / BLOCK_SIZE) * BLOCK_SIZE;
    let mut input = vec![0.0f32; frames];
    for click in input.iter_mut().step_by(12_000) {
        *click = 1.0;
    }

    let mut rendered = Vec::with_capacity(input.len() * 2);
    let mut output = vec![0.0f32; BLOCK_SIZE * 2];
    for block in input.chunks_exact(BLOCK_SIZE) {
        output.fill(0.0);
        manager.process(block, &mut output, 1, 2);
        rendered.extend_from_slice(&output);
    }

    let peak = rendered.iter().fold(0.0f32, |p, s| p.max(s.abs()));
    println!("rendered {} frames, peak {:.3}", rendered.len() / 2, peak);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&output_path, spec).expect("create output file");
    for &sample in &rendered {
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize output file");

    println!("wrote {output_path}");
}
