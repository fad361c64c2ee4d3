use crate::config::EffectConfig;
use crate::feather::{self, FeatherPlan};
use crate::geometry::ViewportGeometry;
use crate::plate::BackgroundPlate;
use crate::projection;
use crate::raster::Raster;

/// Builds the output frame: live video as the base layer, the masked subject
/// erased and the clean plate revealed underneath.
///
/// Owns its output and scratch rasters; they are resized in place when the
/// viewport changes and otherwise reused every frame.
pub struct Compositor {
    output: Raster,
    mask: Raster,
    scratch: Vec<u8>,
    last_feather: Option<FeatherPlan>,
}

impl Compositor {
    pub fn new(geometry: &ViewportGeometry) -> Self {
        Self {
            output: Raster::new(geometry.width, geometry.height),
            mask: Raster::new(geometry.width, geometry.height),
            scratch: Vec::new(),
            last_feather: None,
        }
    }

    pub fn output(&self) -> &Raster {
        &self.output
    }

    /// Feathering applied by the last composite that replaced the subject.
    pub fn last_feather(&self) -> Option<FeatherPlan> {
        self.last_feather
    }

    pub fn compose(
        &mut self,
        frame: &Raster,
        mask: Option<&Raster>,
        plate: &BackgroundPlate,
        config: &EffectConfig,
        replace_subject: bool,
        geometry: &ViewportGeometry,
    ) -> &Raster {
        let _span = tracing::debug_span!("compose").entered();
        self.last_feather = None;
        let dims = geometry.dimensions();

        self.output.resize(dims.0, dims.1);
        self.output.clear();
        let video = projection::cover(frame.dimensions(), dims, config.mirror);
        projection::draw_copy(frame, &mut self.output, &video);

        if !config.enabled || !replace_subject || !plate.is_ready() {
            return &self.output;
        }
        let Some(mask) = mask else {
            return &self.output;
        };

        self.mask.resize(dims.0, dims.1);
        self.mask.clear();
        let stencil = projection::cover(mask.dimensions(), dims, config.mirror);
        projection::draw_copy(mask, &mut self.mask, &stencil);

        // Each feather pass erases with the same once-blurred mask, so the
        // kept opacity compounds as (1 - m)^passes.
        let plan = FeatherPlan::new(config.blur_radius, geometry.dpr);
        if !plan.is_sharp() {
            let _span = tracing::debug_span!("feather", passes = plan.passes).entered();
            feather::gaussian_blur_alpha(&mut self.mask, &mut self.scratch, plan.radius_px);
        }
        self.last_feather = Some(plan);

        for _ in 0..plan.passes.max(1) {
            erase(&mut self.output, &self.mask);
        }

        let under = projection::stretch(plate.raster().dimensions(), dims, config.mirror);
        projection::draw(plate.raster(), &mut self.output, &under, reveal);

        &self.output
    }
}

/// Remove destination opacity in proportion to mask alpha.
fn erase(output: &mut Raster, mask: &Raster) {
    for (dst, m) in output
        .as_bytes_mut()
        .chunks_exact_mut(4)
        .zip(mask.as_bytes().chunks_exact(4))
    {
        let keep = 255 - m[3] as u16;
        dst[3] = ((dst[3] as u16 * keep + 127) / 255) as u8;
    }
}

/// Draw `src` beneath `dst`: it only shows where `dst` is not opaque.
fn reveal(dst: &mut [u8], src: [u8; 4]) {
    let da = dst[3] as f32 / 255.0;
    if da >= 1.0 {
        return;
    }
    let sa = src[3] as f32 / 255.0 * (1.0 - da);
    let out_a = da + sa;
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let v = (dst[c] as f32 * da + src[c] as f32 * sa) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
