use std::path::Path;

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{Array1, Array4, Ix4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;

use super::preprocess::Preprocessor;
use super::types::{Matte, SegmentationModel};

/// Model input edge; 512x512 balances quality and latency.
const INPUT_SIZE: u32 = 512;

/// Recurrent state carried between frames for temporal consistency.
struct HiddenState {
    r1: Array4<f32>,
    r2: Array4<f32>,
    r3: Array4<f32>,
    r4: Array4<f32>,
}

impl HiddenState {
    /// The exported graph accepts `[1, 1, 1, 1]` zeros as the initial state
    /// and broadcasts from there.
    fn initial() -> Self {
        let zero = || Array4::<f32>::zeros((1, 1, 1, 1));
        Self {
            r1: zero(),
            r2: zero(),
            r3: zero(),
            r4: zero(),
        }
    }
}

/// RobustVideoMatting over ONNX Runtime.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    downsample_ratio: f32,
    state: Option<HiddenState>,
}

impl RobustVideoMatting {
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(INPUT_SIZE, INPUT_SIZE),
            downsample_ratio: 0.25,
            state: None,
        })
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let state = self.state.take().unwrap_or_else(HiddenState::initial);
        let input = self.preprocessor.preprocess(frame);
        let ratio = Array1::from_elem(1, self.downsample_ratio);

        // inputs: src, r1i..r4i, downsample_ratio
        // outputs: fgr, pha, r1o..r4o
        let outputs = self
            .session
            .run(ort::inputs![
                TensorRef::from_array_view(&input)?,
                TensorRef::from_array_view(&state.r1)?,
                TensorRef::from_array_view(&state.r2)?,
                TensorRef::from_array_view(&state.r3)?,
                TensorRef::from_array_view(&state.r4)?,
                TensorRef::from_array_view(&ratio)?
            ])
            .context("Failed to run inference")?;

        let pha = outputs[1].try_extract_array::<f32>()?;
        let shape = pha.shape().to_vec();
        let (matte_height, matte_width) = match shape.as_slice() {
            [1, 1, h, w] => (*h as u32, *w as u32),
            other => anyhow::bail!("unexpected matte shape {:?}", other),
        };
        let alpha: Vec<f32> = pha.iter().copied().collect();

        let mut recurrent = Vec::with_capacity(4);
        for i in 2..6 {
            recurrent.push(
                outputs[i]
                    .try_extract_array::<f32>()?
                    .to_owned()
                    .into_dimensionality::<Ix4>()?,
            );
        }
        let [r1, r2, r3, r4]: [Array4<f32>; 4] = recurrent
            .try_into()
            .map_err(|_| anyhow::anyhow!("expected four recurrent outputs"))?;
        drop(outputs);
        self.state = Some(HiddenState { r1, r2, r3, r4 });

        let (frame_width, frame_height) = frame.dimensions();
        Preprocessor::postprocess_matte(
            &alpha,
            matte_width,
            matte_height,
            frame_width,
            frame_height,
        )
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.state = None;
    }

    fn input_size(&self) -> (u32, u32) {
        (INPUT_SIZE, INPUT_SIZE)
    }
}
