//! Transparency compute pass.
//!
//! Writes the source color with alpha replaced by the window opacity. With a
//! color key configured, only pixels matching the key get the opacity and all
//! others stay opaque. The key `(-1, -1, -1)` matches nothing a texture can
//! hold and means "apply opacity everywhere".

use bytemuck::{Pod, Zeroable};

use super::Extent;

/// Color key value that disables keying.
pub const COLOR_KEY_DISABLED: [f32; 3] = [-1.0, -1.0, -1.0];

/// Constant buffer layout shared with [`TRANSPARENCY_HLSL`]. Two 16-byte
/// registers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransparencyConstants {
    pub transparent_color: [f32; 3],
    pub alpha: f32,
    /// Top-left of the copied region in the source texture.
    pub source_offset: [u32; 2],
    /// Size of the copied region. Threads outside it do nothing.
    pub extent: [u32; 2],
}

impl TransparencyConstants {
    pub fn new(transparent_color: [f32; 3], alpha: f32, source_offset: [u32; 2], extent: Extent) -> Self {
        Self {
            transparent_color,
            alpha: alpha.clamp(0.0, 1.0),
            source_offset,
            extent: [extent.width, extent.height],
        }
    }

    pub fn color_key_disabled(&self) -> bool {
        self.transparent_color == COLOR_KEY_DISABLED
    }
}

/// `cs_5_0` source. `GROUP_SIZE` is defined at compile time.
pub const TRANSPARENCY_HLSL: &str = r#"
cbuffer TransparencyConstants : register(b0)
{
    float3 TransparentColor;
    float Alpha;
    uint2 SourceOffset;
    uint2 Extent;
};

Texture2D<float4> Input : register(t0);
RWTexture2D<float4> Output : register(u0);

#ifndef GROUP_SIZE
#define GROUP_SIZE 32
#endif

[numthreads(GROUP_SIZE, GROUP_SIZE, 1)]
void main(uint3 id : SV_DispatchThreadID)
{
    if (id.x >= Extent.x || id.y >= Extent.y)
        return;

    float4 color = Input.Load(int3(id.xy + SourceOffset, 0));
    bool keyDisabled = all(TransparentColor == float3(-1.0, -1.0, -1.0));
    bool keyed = all(color.rgb == TransparentColor);
    color.a = (keyDisabled || keyed) ? Alpha : 1.0;
    Output[id.xy] = color;
}
"#;

pub const TRANSPARENCY_ENTRY_POINT: &str = "main";
pub const TRANSPARENCY_TARGET: &str = "cs_5_0";

/// Thread groups needed to cover `extent` with square groups of `group_size`.
pub fn dispatch_groups(extent: Extent, group_size: u32) -> [u32; 2] {
    let group_size = group_size.max(1);
    [
        extent.width.div_ceil(group_size),
        extent.height.div_ceil(group_size),
    ]
}

/// Alpha the pass writes for a source color. Mirrors the shader.
pub fn transparent_alpha(rgb: [f32; 3], constants: &TransparencyConstants) -> f32 {
    if constants.color_key_disabled() || rgb == constants.transparent_color {
        constants.alpha
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_fit_two_registers() {
        assert_eq!(std::mem::size_of::<TransparencyConstants>(), 32);
    }

    #[test]
    fn test_dispatch_covers_surface() {
        assert_eq!(dispatch_groups(Extent::new(64, 32), 32), [2, 1]);
        assert_eq!(dispatch_groups(Extent::new(65, 33), 32), [3, 2]);
        assert_eq!(dispatch_groups(Extent::new(1, 1), 32), [1, 1]);
        assert_eq!(dispatch_groups(Extent::new(10, 10), 0), [10, 10]);
    }

    #[test]
    fn test_uniform_alpha_without_key() {
        let constants =
            TransparencyConstants::new(COLOR_KEY_DISABLED, 0.5, [0, 0], Extent::new(4, 4));
        assert_eq!(transparent_alpha([0.2, 0.4, 0.6], &constants), 0.5);
        assert_eq!(transparent_alpha([0.0, 0.0, 0.0], &constants), 0.5);
    }

    #[test]
    fn test_color_key() {
        let constants =
            TransparencyConstants::new([1.0, 0.0, 1.0], 0.25, [0, 0], Extent::new(4, 4));
        assert_eq!(transparent_alpha([1.0, 0.0, 1.0], &constants), 0.25);
        assert_eq!(transparent_alpha([1.0, 0.0, 0.9], &constants), 1.0);
    }

    #[test]
    fn test_alpha_is_clamped() {
        let constants =
            TransparencyConstants::new(COLOR_KEY_DISABLED, 1.5, [0, 0], Extent::new(1, 1));
        assert_eq!(constants.alpha, 1.0);
    }
}
