use serde::Serialize;

use crate::models::Selections;

/// One selector group offered by a stage's prompt assistant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub title: &'static str,
    pub key: &'static str,
    pub options: &'static [&'static str],
    pub allow_custom: bool,
}

pub const PHOTO_SHOOT_CATEGORIES: &[Category] = &[
    Category {
        title: "Model Type",
        key: "model",
        options: &["Professional female model", "Professional male model", "Realistic mannequin"],
        allow_custom: false,
    },
    Category {
        title: "Ethnicity",
        key: "ethnicity",
        options: &["Black African", "East African", "West African", "North African"],
        allow_custom: false,
    },
    Category {
        title: "Body Archetype",
        key: "bodyArchetype",
        options: &["Slender", "Curvy", "Athletic", "Plus-size"],
        allow_custom: false,
    },
    Category {
        title: "Background",
        key: "background",
        options: &["Clean studio background", "Outdoor nature scene", "Urban cityscape", "Beach setting"],
        allow_custom: false,
    },
    Category {
        title: "Lighting",
        key: "lighting",
        options: &["Bright studio lighting", "Golden hour sunlight", "Soft natural light"],
        allow_custom: false,
    },
];

pub const AD_SCENE_CATEGORIES: &[Category] = &[
    Category {
        title: "Scene Style",
        key: "style",
        options: &["Modern City", "Traditional Market", "Lush Nature", "Luxury Interior"],
        allow_custom: false,
    },
    Category {
        title: "Vibe / Mood",
        key: "vibe",
        options: &["Elegant & Luxurious", "Joyful & Celebratory", "Casual & Relaxed", "Professional & Sharp"],
        allow_custom: false,
    },
    Category {
        title: "Ethnicity",
        key: "ethnicity",
        options: &["Black African", "East African", "West African", "North African"],
        allow_custom: false,
    },
    Category {
        title: "Body Archetype",
        key: "bodyArchetype",
        options: &["Slender", "Curvy", "Athletic", "Plus-size"],
        allow_custom: false,
    },
    Category {
        title: "Location",
        key: "location",
        options: &["Nairobi", "Lagos", "Cape Town"],
        allow_custom: true,
    },
];

pub const DEFAULT_VIDEO_PROMPT: &str =
    "A 5-second video of the model smiling and spinning in the featured product.";

/// Every category defaults to its first enumerated option.
pub fn default_selections(categories: &[Category]) -> Selections {
    categories
        .iter()
        .map(|cat| {
            let value = cat.options.first().copied().unwrap_or("");
            (cat.key.to_string(), value.to_string())
        })
        .collect()
}

fn get<'a>(selections: &'a Selections, key: &str, fallback: &'a str) -> &'a str {
    selections
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
}

/// Photo studio instruction. The whole action section branches on whether a
/// user-supplied model photo is attached: composition of two inputs vs.
/// generation of a model from the selected description.
pub fn photo_shoot_prompt(selections: &Selections, has_model_photo: bool) -> String {
    let core_instruction = "**OUTPUT MUST BE AN IMAGE.** You are an expert fashion e-commerce \
        photographer and retoucher. Your task is to create a single, ultra-realistic, \
        photorealistic, 8K image."
        .to_string();

    let action_and_subject = if has_model_photo {
        "**Action:** Composite the two input images.\n\
         - **Input Image 1 (Product):** Contains the clothing article.\n\
         - **Input Image 2 (Model):** Contains the person.\n\
         - **Task:** Place the product from Input Image 1 onto the person from Input Image 2. \
         The fit must be perfect, tailored, and realistic, with accurate shadows and fabric draping."
            .to_string()
    } else {
        let model_description = format!(
            "A {}, {}, {}",
            get(selections, "ethnicity", "Black African"),
            get(selections, "bodyArchetype", "Slender"),
            get(selections, "model", "professional female model"),
        );
        format!(
            "**Action:** Generate a new image based on the input product image.\n\
             - **Input Image 1 (Product):** Contains the clothing article.\n\
             - **Task:** Generate a full-body image of a {model_description} wearing the exact \
             product from Input Image 1."
        )
    };

    let scene_description = format!(
        "**Scene:** A professional photoshoot set against a {}.\n\
         **Lighting:** {}, creating a high-end commercial look.",
        get(selections, "background", "Clean studio background"),
        get(selections, "lighting", "Bright studio lighting"),
    );

    let fidelity_mandate = "**Fidelity Mandate (CRITICAL):**\n\
        - You MUST preserve the exact design, pattern, color, texture, and details of the \
        clothing from the input image.\n\
        - You MUST preserve the exact cut, length, and style of the clothing. For example, if \
        the input is a short dress, the output must be a short dress of the same length.\n\
        - **DO NOT alter the garment's design in any way.** Your task is to place it on a model, \
        not redesign it."
        .to_string();

    [core_instruction, action_and_subject, scene_description, fidelity_mandate].join("\n\n")
}

/// Ad campaign instruction: re-contextualize the photoshoot subject into a
/// new scene while leaving the person and garment untouched.
pub fn ad_scene_prompt(selections: &Selections, product_description: &str) -> String {
    let location = get(selections, "location", "a vibrant African city");
    let style = get(selections, "style", "Modern City");
    let vibe = get(selections, "vibe", "Elegant & Luxurious");
    let subject = if product_description.is_empty() {
        "the featured product"
    } else {
        product_description
    };

    let core_instruction = "**OUTPUT MUST BE AN IMAGE.** You are an expert creative director and \
        retoucher for a high-end advertising campaign. Your task is to take the subject from the \
        input image and place them into a new, photorealistic, 8K scene."
        .to_string();

    let action_and_subject = "**Action:** Re-contextualize the subject from the input image into \
        a new environment.\n\
        - **Input Image:** Contains the model wearing the product. This is your primary asset.\n\
        - **Task:** Create a new scene as described below, featuring the *exact same person and \
        attire* from the Input Image."
        .to_string();

    let scene_description = format!(
        "**New Scene:** A professional advertising photograph.\n\
         - **Environment:** A {style} setting in {location}.\n\
         - **Vibe & Mood:** The scene should feel {vibe}.\n\
         - **Lighting:** Cinematic, professional lighting that matches the new environment perfectly.\n\
         - **Product Context:** The model is wearing: {subject}."
    );

    let fidelity_mandate = "**Fidelity Mandate (CRITICAL):**\n\
        - It is critical that you maintain the exact appearance of the person and their attire \
        from the Input Image.\n\
        - You MUST preserve the exact design, pattern, color, texture, details, cut, length, and \
        style of the clothing.\n\
        - **DO NOT change the garment or the model's appearance.** Your only job is to place them \
        seamlessly into the new scene."
        .to_string();

    [core_instruction, action_and_subject, scene_description, fidelity_mandate].join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_take_the_first_option_of_every_category() {
        let selections = default_selections(PHOTO_SHOOT_CATEGORIES);
        assert_eq!(selections["model"], "Professional female model");
        assert_eq!(selections["lighting"], "Bright studio lighting");
        assert_eq!(selections.len(), PHOTO_SHOOT_CATEGORIES.len());
    }

    #[test]
    fn photo_shoot_prompt_interpolates_selections() {
        let mut selections = default_selections(PHOTO_SHOOT_CATEGORIES);
        selections.insert("background".into(), "Beach setting".into());
        selections.insert("lighting".into(), "Golden hour sunlight".into());

        let prompt = photo_shoot_prompt(&selections, false);
        assert!(prompt.contains("Beach setting"));
        assert!(prompt.contains("Golden hour sunlight"));
        assert!(prompt.contains("**OUTPUT MUST BE AN IMAGE.**"));
        assert!(prompt.contains("not redesign it"));
    }

    #[test]
    fn model_photo_switches_the_whole_action_branch() {
        let selections = default_selections(PHOTO_SHOOT_CATEGORIES);

        let generated = photo_shoot_prompt(&selections, false);
        assert!(generated.contains("Generate a full-body image"));
        assert!(!generated.contains("Composite the two input images"));

        let composited = photo_shoot_prompt(&selections, true);
        assert!(composited.contains("Composite the two input images"));
        // Composition mode ignores the model-description selectors entirely.
        assert!(!composited.contains("Professional female model"));
        assert!(!composited.contains("Generate a full-body image"));
    }

    #[test]
    fn ad_scene_prompt_contains_selections_and_fidelity_mandate() {
        let mut selections = default_selections(AD_SCENE_CATEGORIES);
        selections.insert("style".into(), "Traditional Market".into());
        selections.insert("vibe".into(), "Joyful & Celebratory".into());

        let prompt = ad_scene_prompt(&selections, "a vibrant kitenge print dress");
        assert!(prompt.contains("Traditional Market"));
        assert!(prompt.contains("Joyful & Celebratory"));
        assert!(prompt.contains("a vibrant kitenge print dress"));
        assert!(prompt.contains(
            "**DO NOT change the garment or the model's appearance.** Your only job is to place \
             them seamlessly into the new scene."
        ));
    }

    #[test]
    fn ad_scene_prompt_falls_back_for_missing_values() {
        let mut selections = Selections::new();
        selections.insert("location".into(), String::new());

        let prompt = ad_scene_prompt(&selections, "");
        assert!(prompt.contains("a vibrant African city"));
        assert!(prompt.contains("Modern City"));
        assert!(prompt.contains("the featured product"));
    }
}
