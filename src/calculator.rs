//! Formulation calculator logic

use crate::models::{
    AdditiveEntry, FattyAcid, FattyAcidProfile, FormulationResult, OilLine, RecipeInput,
    SoapProperties,
};

/// Calculate the weighted fatty acid profile of an oil blend
///
/// Each fraction is the mass-fraction weighted sum of the oils' fractions.
/// `total_weight` must be non-zero; oil data is used as-is, so a blend of
/// oils whose fractions don't reach 100 won't reach 100 either.
pub fn aggregate_fatty_acids(lines: &[OilLine], total_weight: f64) -> FattyAcidProfile {
    debug_assert!(total_weight != 0.0, "blend profile needs a non-zero oil weight");

    let mut profile = FattyAcidProfile::default();
    for line in lines {
        let share = line.weight / total_weight;
        for acid in FattyAcid::ALL {
            *profile.get_mut(acid) += line.oil.fatty_acids.get(acid) * share;
        }
    }
    profile
}

/// The five soap quality scores
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityScores {
    pub hardness: f64,
    pub cleansing: f64,
    pub conditioning: f64,
    pub bubbly: f64,
    pub creamy: f64,
}

/// Map a fatty acid profile to soap quality scores
pub fn derive_scores(p: &FattyAcidProfile) -> QualityScores {
    QualityScores {
        hardness: p.lauric + p.myristic + p.palmitic + p.stearic,
        cleansing: p.lauric + p.myristic,
        conditioning: p.oleic + p.linoleic + p.linolenic + p.ricinoleic,
        bubbly: p.lauric + p.myristic + p.ricinoleic,
        creamy: p.palmitic + p.stearic + p.ricinoleic,
    }
}

/// Mass-weighted INS of the blend
pub fn blend_ins(lines: &[OilLine], total_weight: f64) -> f64 {
    lines
        .iter()
        .map(|line| line.oil.ins * (line.weight / total_weight))
        .sum()
}

/// Lye needed to saponify every gram of oil (0% superfat)
pub fn total_lye(lines: &[OilLine]) -> f64 {
    lines.iter().map(|line| line.weight * line.oil.sap).sum()
}

/// Discount the full lye demand by the superfat percentage.
///
/// Out-of-range superfat is not rejected: above 100% the result goes negative.
pub fn lye_amount(total_lye: f64, superfat_percent: f64) -> f64 {
    total_lye * (1.0 - superfat_percent / 100.0)
}

pub fn water_amount(total_weight: f64, water_percent: f64) -> f64 {
    total_weight * (water_percent / 100.0)
}

/// Keep only additives that are both named and weighed, in order
pub fn active_additives(entries: &[AdditiveEntry]) -> Vec<AdditiveEntry> {
    entries.iter().filter(|e| e.is_active()).cloned().collect()
}

/// Calculate the complete numeric result for a recipe
///
/// Returns `None` when the oils weigh nothing in total; there is nothing to
/// formulate. Every other input passes through unchecked.
pub fn formulate(input: &RecipeInput, description: &str) -> Option<FormulationResult> {
    let total_weight = input.total_weight();
    if total_weight == 0.0 {
        return None;
    }

    let profile = aggregate_fatty_acids(&input.oils, total_weight);
    let scores = derive_scores(&profile);
    let lye = total_lye(&input.oils);

    let properties = SoapProperties {
        hardness: scores.hardness,
        cleansing: scores.cleansing,
        conditioning: scores.conditioning,
        bubbly: scores.bubbly,
        creamy: scores.creamy,
        ins: blend_ins(&input.oils, total_weight),
        total_weight,
        lye_amount: lye_amount(lye, input.superfat),
        water_amount: water_amount(total_weight, input.water_percent),
    };

    Some(FormulationResult {
        properties,
        fatty_acid_profile: profile,
        description: description.to_string(),
        essential_oils: active_additives(&input.essential_oils),
        powders: active_additives(&input.powders),
    })
}

/// Recommended range for a soap quality
#[derive(Debug, Clone, Copy)]
pub struct PropertyRange {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
}

impl PropertyRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const PROPERTY_RANGES: [PropertyRange; 6] = [
    PropertyRange {
        name: "Hardness",
        min: 29.0,
        max: 54.0,
    },
    PropertyRange {
        name: "Cleansing",
        min: 12.0,
        max: 22.0,
    },
    PropertyRange {
        name: "Conditioning",
        min: 44.0,
        max: 69.0,
    },
    PropertyRange {
        name: "Bubbly",
        min: 14.0,
        max: 46.0,
    },
    PropertyRange {
        name: "Creamy",
        min: 16.0,
        max: 48.0,
    },
    PropertyRange {
        name: "INS",
        min: 136.0,
        max: 165.0,
    },
];

fn property_values(p: &SoapProperties) -> [f64; 6] {
    [p.hardness, p.cleansing, p.conditioning, p.bubbly, p.creamy, p.ins]
}

/// Split a generated description into `### ` headed sections.
///
/// Text without any heading comes back as a single untitled section.
pub fn description_sections(description: &str) -> Vec<(Option<String>, String)> {
    let mut sections: Vec<(Option<String>, String)> = Vec::new();

    for line in description.lines().filter(|l| !l.trim().is_empty()) {
        if let Some(title) = line.strip_prefix("### ") {
            sections.push((Some(title.trim().to_string()), String::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push_str(line);
            body.push('\n');
        } else {
            return vec![(None, description.trim().to_string())];
        }
    }

    sections
}

/// Printable summary of a formulation result
pub struct RecipeReport<'a> {
    pub result: &'a FormulationResult,
}

impl RecipeReport<'_> {
    pub fn additive_weight(&self) -> f64 {
        self.result
            .essential_oils
            .iter()
            .chain(self.result.powders.iter())
            .map(|a| a.weight)
            .sum()
    }

    pub fn recipe_weight(&self) -> f64 {
        let p = &self.result.properties;
        p.total_weight + p.water_amount + p.lye_amount + self.additive_weight()
    }
}

impl std::fmt::Display for RecipeReport<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let p = &self.result.properties;

        writeln!(f, "=== Recipe Summary ===")?;
        writeln!(f, "  Oils:       {:>8.1} g", p.total_weight)?;
        writeln!(f, "  Water:      {:>8.1} g", p.water_amount)?;
        writeln!(f, "  Lye (NaOH): {:>8.1} g", p.lye_amount)?;
        writeln!(f, "  Additives:  {:>8.1} g", self.additive_weight())?;
        writeln!(f, "  Total:      {:>8.1} g", self.recipe_weight())?;
        writeln!(f)?;

        writeln!(f, "Soap qualities:")?;
        for (range, value) in PROPERTY_RANGES.iter().zip(property_values(p)) {
            let flag = if range.contains(value) { "ok" } else { "out of range" };
            writeln!(
                f,
                "  {:<13} {:>4.0}   ({:.0}-{:.0}, {})",
                range.name, value, range.min, range.max, flag
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Fatty acids:")?;
        for (acid, fraction) in self.result.fatty_acid_profile.iter() {
            if fraction > 0.0 {
                writeln!(f, "  {:<11} {:>5.1}%", acid.name(), fraction)?;
            }
        }

        for (label, additives) in [
            ("Essential oils", &self.result.essential_oils),
            ("Powders", &self.result.powders),
        ] {
            if !additives.is_empty() {
                writeln!(f)?;
                writeln!(f, "{}:", label)?;
                for a in additives {
                    writeln!(f, "  {} @ {:.1} g", a.name, a.weight)?;
                }
            }
        }
        writeln!(f)?;

        writeln!(f, "Description:")?;
        for (title, body) in description_sections(&self.result.description) {
            if let Some(title) = title {
                writeln!(f, "  [{}]", title)?;
            }
            for line in body.lines() {
                writeln!(f, "    {}", line)?;
            }
        }

        Ok(())
    }
}
