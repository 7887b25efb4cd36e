use serde::Serialize;

/// Display-only pricing tiers. There is no billing behind these; the client
/// renders them as-is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTier {
    pub tier: &'static str,
    pub price: &'static str,
    pub description: &'static str,
    pub features: &'static [&'static str],
    pub popular: bool,
}

pub const TIERS: &[PricingTier] = &[
    PricingTier {
        tier: "Starter",
        price: "Free",
        description: "A taste of AI power. Perfect for getting started and seeing the potential.",
        features: &[
            "3 Background Removals/month",
            "3 AI Scene Generations (Watermarked)",
            "No Video Generation",
        ],
        popular: false,
    },
    PricingTier {
        tier: "Creator",
        price: "Ksh 800",
        description: "For the dedicated artisan ready to build a consistent, professional brand online.",
        features: &[
            "Up to 1,000 Background Removals",
            "20 HD Scene Generations",
            "3 Video Clips (5-sec each)",
            "Remove Watermarks",
        ],
        popular: false,
    },
    PricingTier {
        tier: "Business",
        price: "Ksh 1,500",
        description: "The ultimate toolkit for serious entrepreneurs focused on scaling their brand and sales.",
        features: &[
            "Everything in Creator",
            "50 HD Scene Generations",
            "10 Video Clips",
            "Save Your Custom Model",
            "Priority Rendering Queue",
            "Batch Upload (10 images)",
        ],
        popular: true,
    },
    PricingTier {
        tier: "Studio",
        price: "Ksh 5,000",
        description: "For agencies and power users managing multiple brands with high-volume needs.",
        features: &[
            "Everything in Business",
            "Up to 500 Scene Generations",
            "30 Video Clips",
            "Team Seats (Up to 3 Users)",
            "White-Label Branding",
            "Dedicated Support",
        ],
        popular: false,
    },
];
