//! Streaming speech recognition.
//!
//! A transducer over three ONNX sessions:
//!
//! | Model   | Role |
//! |---------|------|
//! | encoder | log-mel frames → acoustic embeddings (stateful across chunks) |
//! | decoder | recent token context → label embedding |
//! | joiner  | acoustic + label embeddings → next-token logits |
//!
//! Audio is accepted as 16 kHz mono f32 PCM in arbitrarily sized pieces,
//! buffered internally, and decoded greedily one fixed-size chunk at a time.
//! The encoder's cache tensors are threaded through every call, so the
//! partial transcript grows monotonically across chunks.
//!
//! The encoder's own graph declares its streaming state: every input after
//! the feature tensor is treated as a cache, initialised to zeros from its
//! declared shape, and replaced by the matching output after each run.

pub mod download;
pub mod features;
pub mod tokens;

use std::path::Path;

use anyhow::{bail, Context, Result};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionInputValue};
use ort::tensor::TensorElementType;
use ort::value::{Tensor, ValueType};

use features::{FbankExtractor, FRAME_LENGTH, FRAME_SHIFT, NUM_BINS};
use tokens::append_piece;

/// Blank token id in the joiner's output distribution.
const BLANK_ID: usize = 0;
/// Cap on non-blank emissions per encoder frame; greedy search re-runs the
/// decoder on the same frame until it emits blank.
const MAX_SYMBOLS_PER_FRAME: usize = 5;
/// Fallback decoding chunk when the encoder declares a dynamic frame axis.
const DEFAULT_CHUNK_SAMPLES: usize = 7_680; // 480 ms at 16 kHz

/// Model artifact filenames inside the model directory.
pub const TOKENS_FILE: &str = "tokens.txt";
pub const ENCODER_FILE: &str = "encoder.int8.onnx";
pub const DECODER_FILE: &str = "decoder.int8.onnx";
pub const JOINER_FILE: &str = "joiner.int8.onnx";

// ─────────────────────────────────────────────────────────────────────────────
// Encoder cache state
// ─────────────────────────────────────────────────────────────────────────────

/// One encoder cache tensor held between runs, in its extracted form.
enum StateBuffer {
    F32 { shape: Vec<usize>, data: Vec<f32> },
    I64 { shape: Vec<usize>, data: Vec<i64> },
}

impl StateBuffer {
    fn zeros(ty: TensorElementType, shape: Vec<usize>) -> Result<Self> {
        let len = shape.iter().product();
        match ty {
            TensorElementType::Float32 => Ok(Self::F32 {
                shape,
                data: vec![0.0; len],
            }),
            TensorElementType::Int64 => Ok(Self::I64 {
                shape,
                data: vec![0; len],
            }),
            other => bail!("Unsupported encoder state element type: {:?}", other),
        }
    }

    fn to_input(&self) -> Result<SessionInputValue<'static>> {
        Ok(match self {
            Self::F32 { shape, data } => {
                Tensor::<f32>::from_array((shape.clone(), data.clone()))
                    .context("Failed to build f32 state tensor")?
                    .into()
            }
            Self::I64 { shape, data } => {
                Tensor::<i64>::from_array((shape.clone(), data.clone()))
                    .context("Failed to build i64 state tensor")?
                    .into()
            }
        })
    }
}

/// Replace dynamic (non-positive) dimensions with 1 — streaming runs a batch
/// of one.
fn resolve_dims(declared: &[i64]) -> Vec<usize> {
    declared
        .iter()
        .map(|&d| if d > 0 { d as usize } else { 1 })
        .collect()
}

/// Index of the largest value; the first wins ties so blank (id 0) is never
/// displaced by an equal-scoring token.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = i;
        }
    }
    best
}

fn load_session(path: &Path) -> Result<Session> {
    Session::builder()
        .context("Failed to create ORT session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(num_cpus())
        .context("Failed to set thread count")?
        .commit_from_file(path)
        .with_context(|| format!("Cannot load ONNX model: {}", path.display()))
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(4)
}

// ─────────────────────────────────────────────────────────────────────────────
// StreamingRecognizer
// ─────────────────────────────────────────────────────────────────────────────

pub struct StreamingRecognizer {
    encoder: Session,
    decoder: Session,
    joiner: Session,
    tokens: Vec<String>,
    fbank: FbankExtractor,

    /// Encoder cache tensors, fed back on every chunk.
    encoder_states: Vec<StateBuffer>,
    /// Recent token ids conditioning the decoder.
    context: Vec<i64>,
    /// Cached decoder output for the current context.
    decoder_out: Vec<f32>,

    sample_buffer: Vec<f32>,
    chunk_samples: usize,
    transcript: String,
}

impl StreamingRecognizer {
    /// Load the recognizer from a model directory containing
    /// `tokens.txt`, `encoder.int8.onnx`, `decoder.int8.onnx` and
    /// `joiner.int8.onnx`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let tokens = tokens::load_tokens(&model_dir.join(TOKENS_FILE))?;

        let encoder = load_session(&model_dir.join(ENCODER_FILE))?;
        let decoder = load_session(&model_dir.join(DECODER_FILE))?;
        let joiner = load_session(&model_dir.join(JOINER_FILE))?;

        // The first encoder input is the feature tensor [1, T, 80]; the rest
        // are caches. A fixed T pins the decoding chunk size.
        let mut encoder_states = Vec::new();
        let mut chunk_samples = DEFAULT_CHUNK_SAMPLES;
        for (i, input) in encoder.inputs().into_iter().enumerate() {
            let ValueType::Tensor { ty, shape, .. } = input.dtype() else {
                bail!("Encoder input {} is not a tensor", i);
            };
            if i == 0 {
                if shape.len() >= 2 && shape[1] > 0 {
                    chunk_samples = (shape[1] as usize - 1) * FRAME_SHIFT + FRAME_LENGTH;
                }
                continue;
            }
            encoder_states.push(StateBuffer::zeros(*ty, resolve_dims(shape))?);
        }

        // Decoder context width from its declared input [1, context_size].
        let context_size = decoder
            .inputs()
            .into_iter()
            .next()
            .and_then(|input| match input.dtype() {
                ValueType::Tensor { shape, .. } if shape.len() >= 2 && shape[1] > 0 => {
                    Some(shape[1] as usize)
                }
                _ => None,
            })
            .unwrap_or(2);

        let mut recognizer = Self {
            encoder,
            decoder,
            joiner,
            tokens,
            fbank: FbankExtractor::new(),
            encoder_states,
            context: vec![BLANK_ID as i64; context_size],
            decoder_out: Vec::new(),
            sample_buffer: Vec::new(),
            chunk_samples,
            transcript: String::new(),
        };
        let initial_decoder_out = recognizer.run_decoder()?;
        recognizer.decoder_out = initial_decoder_out;
        Ok(recognizer)
    }

    /// The transcript decoded so far.
    pub fn partial(&self) -> &str {
        &self.transcript
    }

    /// Accept a piece of 16 kHz mono f32 PCM and decode any complete chunks.
    ///
    /// Returns `true` when the partial transcript changed.
    pub fn accept_waveform(&mut self, samples: &[f32]) -> Result<bool> {
        self.sample_buffer.extend_from_slice(samples);

        let before = self.transcript.len();
        while self.sample_buffer.len() >= self.chunk_samples {
            let chunk: Vec<f32> = self.sample_buffer.drain(..self.chunk_samples).collect();
            self.decode_chunk(&chunk)?;
        }
        Ok(self.transcript.len() != before)
    }

    fn decode_chunk(&mut self, chunk: &[f32]) -> Result<()> {
        let (features, num_frames) = self.fbank.compute(chunk)?;

        // Encoder: features plus every cache tensor, positionally.
        let mut inputs: Vec<SessionInputValue<'static>> = Vec::with_capacity(
            1 + self.encoder_states.len(),
        );
        inputs.push(
            Tensor::<f32>::from_array(([1usize, num_frames, NUM_BINS], features))
                .context("Failed to build feature tensor")?
                .into(),
        );
        for state in &self.encoder_states {
            inputs.push(state.to_input()?);
        }

        let (encoder_out, encoder_dims, new_states) = {
            let outputs = self
                .encoder
                .run(inputs)
                .context("Encoder inference failed")?;

            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .context("Failed to extract encoder output")?;
            let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            let encoder_out = data.to_vec();

            // Cache outputs follow the acoustic output, in state order.
            let mut new_states = Vec::with_capacity(self.encoder_states.len());
            for (i, old) in self.encoder_states.iter().enumerate() {
                let value = &outputs[i + 1];
                let state = match old {
                    StateBuffer::F32 { .. } => {
                        let (shape, data) = value
                            .try_extract_tensor::<f32>()
                            .with_context(|| format!("Failed to extract encoder state {}", i))?;
                        StateBuffer::F32 {
                            shape: shape.iter().map(|&d| d as usize).collect(),
                            data: data.to_vec(),
                        }
                    }
                    StateBuffer::I64 { .. } => {
                        let (shape, data) = value
                            .try_extract_tensor::<i64>()
                            .with_context(|| format!("Failed to extract encoder state {}", i))?;
                        StateBuffer::I64 {
                            shape: shape.iter().map(|&d| d as usize).collect(),
                            data: data.to_vec(),
                        }
                    }
                };
                new_states.push(state);
            }
            (encoder_out, dims, new_states)
        };
        self.encoder_states = new_states;

        if encoder_dims.len() != 3 {
            bail!(
                "Expected encoder output [1, T, D], got {:?}",
                encoder_dims
            );
        }
        let (frames_out, dim) = (encoder_dims[1], encoder_dims[2]);

        // Greedy transducer search over the acoustic frames.
        for t in 0..frames_out {
            let frame = &encoder_out[t * dim..(t + 1) * dim];
            for _ in 0..MAX_SYMBOLS_PER_FRAME {
                let logits = self.run_joiner(frame)?;
                let best = argmax(&logits);
                if best == BLANK_ID {
                    break;
                }
                if let Some(piece) = self.tokens.get(best) {
                    append_piece(&mut self.transcript, piece);
                }
                self.context.remove(0);
                self.context.push(best as i64);
                self.decoder_out = self.run_decoder()?;
            }
        }

        Ok(())
    }

    fn run_decoder(&mut self) -> Result<Vec<f32>> {
        let context = Tensor::<i64>::from_array((
            [1usize, self.context.len()],
            self.context.clone(),
        ))
        .context("Failed to build decoder context tensor")?;

        let outputs = self
            .decoder
            .run(ort::inputs![context])
            .context("Decoder inference failed")?;
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract decoder output")?;
        Ok(data.to_vec())
    }

    fn run_joiner(&mut self, encoder_frame: &[f32]) -> Result<Vec<f32>> {
        let acoustic = Tensor::<f32>::from_array((
            [1usize, encoder_frame.len()],
            encoder_frame.to_vec(),
        ))
        .context("Failed to build joiner acoustic tensor")?;
        let label = Tensor::<f32>::from_array((
            [1usize, self.decoder_out.len()],
            self.decoder_out.clone(),
        ))
        .context("Failed to build joiner label tensor")?;

        let outputs = self
            .joiner
            .run(ort::inputs![acoustic, label])
            .context("Joiner inference failed")?;
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract joiner logits")?;
        Ok(data.to_vec())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
