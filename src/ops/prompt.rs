// ============================================================================
// PROMPT COMPOSER — base prompt + style memory + follow-up instructions
// ============================================================================
//
// Order matters to the model: the base prompt leads, the persistent style
// memory follows, and the per-submission instructions come last.

use serde::{Deserialize, Serialize};

/// Marker that opens the style-memory block.
pub const MEMORY_MARKER: &str = "[STYLE MEMORY]";
pub const MEMORY_LABEL: &str = "Custom Rules (always apply):";
pub const REFINEMENT_LABEL: &str = "Refinement Instructions (Apply to provided previous generation):";
pub const ADDITIONAL_LABEL: &str = "Additional Instructions:";

/// Whether a submission works on the original upload or on the last result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptPath {
    Fresh,
    Refinement,
}

/// Assemble the final prompt. Blocks whose text is empty or whitespace are
/// left out; nothing is truncated or escaped.
pub fn compose(base: &str, memory: &str, extra: &str, path: PromptPath) -> String {
    let mut prompt = base.to_string();
    if !memory.trim().is_empty() {
        prompt.push_str(&format!("\n\n{MEMORY_MARKER} {MEMORY_LABEL} {memory}"));
    }
    if !extra.trim().is_empty() {
        let label = match path {
            PromptPath::Refinement => REFINEMENT_LABEL,
            PromptPath::Fresh => ADDITIONAL_LABEL,
        };
        prompt.push_str(&format!("\n\n{label} {extra}"));
    }
    prompt
}

// ============================================================================
// PRESETS — quick prompts grouped by project type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PresetCategory {
    #[default]
    Exterior,
    Interior,
    Plan,
}

impl PresetCategory {
    pub fn all() -> &'static [PresetCategory] {
        &[PresetCategory::Exterior, PresetCategory::Interior, PresetCategory::Plan]
    }

    pub fn label(&self) -> &'static str {
        match self {
            PresetCategory::Exterior => "EXTERIOR",
            PresetCategory::Interior => "INTERIOR",
            PresetCategory::Plan => "PLAN",
        }
    }

    pub fn presets(&self) -> &'static [Preset] {
        match self {
            PresetCategory::Exterior => EXTERIOR_PRESETS,
            PresetCategory::Interior => INTERIOR_PRESETS,
            PresetCategory::Plan => PLAN_PRESETS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub id: &'static str,
    pub label: &'static str,
    pub subtitle: &'static str,
    pub prompt: &'static str,
}

/// Look a preset up by id across all categories.
pub fn find_preset(id: &str) -> Option<&'static Preset> {
    PresetCategory::all()
        .iter()
        .flat_map(|c| c.presets().iter())
        .find(|p| p.id == id)
}

const EXTERIOR_PRESETS: &[Preset] = &[
    Preset {
        id: "sketch-to-photo",
        label: "SKETCH TO PHOTO",
        subtitle: "Convert sketch to realism",
        prompt: "Convert this architectural sketch into a photorealistic rendering. High detail, realistic lighting, natural materials, clear blue sky.",
    },
    Preset {
        id: "lakeside-farmhouse",
        label: "LAKESIDE FARMHOUSE",
        subtitle: "Modern Cabin",
        prompt: "Minimalist Modern Farmhouse Architecture, stunning lakeside house, single-story, long gabled form, exterior clad in natural light-toned vertical wood siding, steep-pitched dark grey metal roof, tall black metal chimney, large floor-to-ceiling black-framed glass sliding doors, simple outdoor patio. Situated in a vast landscape with long, dry golden tussock grasses in the foreground and a neatly mowed green lawn. Backdrop of massive, rugged, towering mountain ranges and rolling grassy foothills, with a deep blue lake visible in the distance. Clear pale blue sky. Golden hour lighting, bright natural daylight, casting sharp shadows. Wide-angle horizontal full-shot, photorealistic, extremely high detail",
    },
    Preset {
        id: "bangkok-street",
        label: "BANGKOK STREET",
        subtitle: "Night Life",
        prompt: "Bangkok street photography, vibrant night life, neon signs, tuk-tuks, street food stalls, power lines silhouetted against the sky, cinematic lighting, cyberpunk atmosphere.",
    },
    Preset {
        id: "modern-min",
        label: "MODERN MINIMALIST",
        subtitle: "Clean & Simple",
        prompt: "Ultra-minimalist Modern House Architecture, pristine white, single-story gabled house, smooth stark white concrete exterior, steep symmetrical gable roof. Features large black-framed glass windows and sliding doors, including a dramatic triangular floor-to-ceiling window on the gable end. Subtle interior elements visible: wooden shelf, minimalist pendant lamp, light-toned furniture. Subtle wisp of smoke from a vent. Set in a dry, arid landscape with sparse golden-brown grasses, low shrubs, and large light-colored boulders. White concrete staircase and gravel pathway in the foreground. Hints of distant soft-hued mountains. Bright, clear natural daylight, high sun, soft subtle shadows. Straight-on, eye-level full-shot. High-resolution, photorealistic, serene, spacious, quiet isolation",
    },
    Preset {
        id: "pool-villa",
        label: "POOL VILLA",
        subtitle: "Luxury Vacation",
        prompt: "Luxurious Modern Italian Villa, grand multi-story structure, pristine white stucco walls, terracotta S-tile roof. Dominant feature is the series of large, symmetrical arched windows and French doors with thin black metal frames. Set on a steep, lush wooded hillside with dense dark green trees in the background. Features a clear azure blue rectangular swimming pool on a large light-colored stone patio terrace, supported by a rugged natural stone retaining wall. Several tall, slender palm trees and potted plants decorate the patio. Bright, clear sunlit day, vibrant and high-contrast lighting. High-angle or elevated view, ultra-high resolution, photorealistic, exclusive summer luxury.",
    },
    Preset {
        id: "modern-twilight",
        label: "MODERN TWILIGHT",
        subtitle: "Dusk Setting",
        prompt: "Modern architectural house at twilight, warm interior lighting glowing through windows, blue hour sky, exterior garden lighting, cozy atmosphere, photorealistic.",
    },
    Preset {
        id: "stone-cottage",
        label: "STONE COTTAGE",
        subtitle: "Modern Rock Pool",
        prompt: "Luxurious Modern Stone Cottage with a Naturalistic Rock Pool. Two-story house, clean horizontal lines, flat roof, natural stacked stone cladding on the lower level, large dark-framed windows, warm modern wood entrance door. House is connected to a secluded, organically shaped rock pool with crystal-clear turquoise and emerald water, edged by massive smooth grey boulders and surrounded by ancient olive trees and low, dense Mediterranean shrubs. Manicured lawn and flowerbeds near the house entrance. Bright, warm natural sunlight, dramatic highlights on the pool and wood. Wide, slightly elevated perspective. Ultra-high resolution, photorealistic architectural render, harmonious integration with nature.",
    },
    Preset {
        id: "luxury-exterior",
        label: "LUXURY EXTERIOR",
        subtitle: "Modern Mediterranean",
        prompt: "Luxurious Modern Mediterranean Architecture, grand two-story house, pristine white stucco exterior, dark grey S-tile roof. Features bold black-framed windows: one large two-story arched window, rectangular windows with black Juliet balconies. Main entrance in a deeply recessed archway with a tall black-framed arched glass door. Symmetrical facade. Meticulously manicured formal landscape, vibrant green lawn, wide smooth white concrete driveway. Symmetrical tall, slender Italian Cypress trees, low, tightly clipped boxwood hedges, large black planters. Soft, overcast or diffused natural lighting, bright and even. Straight-on, eye-level vertical full-shot. High-resolution, photorealistic architectural photography, formal, timeless luxury.",
    },
];

const INTERIOR_PRESETS: &[Preset] = &[
    Preset {
        id: "modern-luxury-int",
        label: "MODERN LUXURY",
        subtitle: "High-end Living",
        prompt: "Modern Luxury Living Room, spacious, double-height ceiling, marble flooring, large crystal chandelier, beige and gold color palette, plush velvet sofa, floor-to-ceiling windows with sheer curtains, warm ambient lighting, 8k photorealistic.",
    },
    Preset {
        id: "japandi-int",
        label: "JAPANDI STYLE",
        subtitle: "Zen & Scandi",
        prompt: "Japandi Interior Design, bedroom, minimalist, light oak wood furniture, low platform bed, linen bedding, soft neutral tones (white, cream, beige), bonsai plant, rice paper lamp, serene atmosphere, natural light.",
    },
    Preset {
        id: "industrial-loft",
        label: "INDUSTRIAL LOFT",
        subtitle: "Raw & Edgy",
        prompt: "Industrial Loft Kitchen, exposed brick walls, concrete ceiling with exposed pipes, black metal pendant lights, reclaimed wood island, stainless steel appliances, large factory-style windows, dramatic lighting.",
    },
    Preset {
        id: "tropical-resort-int",
        label: "TROPICAL RESORT",
        subtitle: "Relaxing Vibes",
        prompt: "Tropical Resort Bedroom, open-air concept, teak wood flooring, rattan furniture, white canopy bed, indoor plants, view of lush green garden, ceiling fan, warm sunlight, relaxing and airy.",
    },
    Preset {
        id: "minimalist-office",
        label: "MINIMALIST OFFICE",
        subtitle: "Productive Space",
        prompt: "Minimalist Home Office, clean white desk, ergonomic chair, floating shelves with few books, large window with city view, soft daylight, clutter-free, inspiring workspace.",
    },
];

const PLAN_PRESETS: &[Preset] = &[
    Preset {
        id: "2d-to-3d-floorplan",
        label: "2D TO 3D FLOORPLAN",
        subtitle: "Basic 3D",
        prompt: "Convert this 2D architectural floor plan into a clear 3D isometric floor plan render. White walls, realistic wooden flooring, basic furniture placement, soft top-down lighting, clean look.",
    },
    Preset {
        id: "realistic-plan",
        label: "REALISTIC 3D PLAN",
        subtitle: "Textured & Lit",
        prompt: "High-quality 3D isometric floor plan rendering from 2D plan. Realistic textures, detailed furniture, shadows and lighting, ambient occlusion, modern interior design style.",
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_is_base_memory_refinement() {
        let out = compose("A", "B", "C", PromptPath::Refinement);
        let a = out.find('A').unwrap();
        let b = out.find(MEMORY_MARKER).unwrap();
        let c = out.find(REFINEMENT_LABEL).unwrap();
        assert!(a < b && b < c);
        assert!(!out.contains(ADDITIONAL_LABEL));
        assert_eq!(
            out,
            format!("A\n\n{MEMORY_MARKER} {MEMORY_LABEL} B\n\n{REFINEMENT_LABEL} C")
        );
    }

    #[test]
    fn fresh_path_uses_additional_label() {
        let out = compose("A", "", "C", PromptPath::Fresh);
        assert_eq!(out, format!("A\n\n{ADDITIONAL_LABEL} C"));
    }

    #[test]
    fn whitespace_blocks_are_skipped() {
        assert_eq!(compose("A", "  \n", "\t", PromptPath::Refinement), "A");
        assert_eq!(compose("", "", "", PromptPath::Fresh), "");
    }

    #[test]
    fn memory_is_verbatim() {
        let memory = "  keep <roof> \"red\"  ";
        let out = compose("A", memory, "", PromptPath::Fresh);
        assert!(out.ends_with(memory));
    }

    #[test]
    fn presets_have_unique_ids() {
        let mut ids: Vec<_> = PresetCategory::all()
            .iter()
            .flat_map(|c| c.presets().iter().map(|p| p.id))
            .collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(find_preset("sketch-to-photo").map(|p| p.label), Some("SKETCH TO PHOTO"));
        assert!(find_preset("nope").is_none());
    }
}
