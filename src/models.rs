//! Data models for soap oils, recipes and calculation results

use serde::{Deserialize, Serialize};

/// The eight fatty acids tracked per oil
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FattyAcid {
    Lauric,
    Myristic,
    Palmitic,
    Stearic,
    Ricinoleic,
    Oleic,
    Linoleic,
    Linolenic,
}

impl FattyAcid {
    pub const ALL: [FattyAcid; 8] = [
        FattyAcid::Lauric,
        FattyAcid::Myristic,
        FattyAcid::Palmitic,
        FattyAcid::Stearic,
        FattyAcid::Ricinoleic,
        FattyAcid::Oleic,
        FattyAcid::Linoleic,
        FattyAcid::Linolenic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FattyAcid::Lauric => "lauric",
            FattyAcid::Myristic => "myristic",
            FattyAcid::Palmitic => "palmitic",
            FattyAcid::Stearic => "stearic",
            FattyAcid::Ricinoleic => "ricinoleic",
            FattyAcid::Oleic => "oleic",
            FattyAcid::Linoleic => "linoleic",
            FattyAcid::Linolenic => "linolenic",
        }
    }
}

/// Fatty acid fractions in percent of oil mass.
///
/// Used both for a single oil's reference data and for the weighted profile
/// of a blend. Values are never clamped or renormalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FattyAcidProfile {
    pub lauric: f64,
    pub myristic: f64,
    pub palmitic: f64,
    pub stearic: f64,
    pub ricinoleic: f64,
    pub oleic: f64,
    pub linoleic: f64,
    pub linolenic: f64,
}

impl FattyAcidProfile {
    pub fn get(&self, acid: FattyAcid) -> f64 {
        match acid {
            FattyAcid::Lauric => self.lauric,
            FattyAcid::Myristic => self.myristic,
            FattyAcid::Palmitic => self.palmitic,
            FattyAcid::Stearic => self.stearic,
            FattyAcid::Ricinoleic => self.ricinoleic,
            FattyAcid::Oleic => self.oleic,
            FattyAcid::Linoleic => self.linoleic,
            FattyAcid::Linolenic => self.linolenic,
        }
    }

    pub fn get_mut(&mut self, acid: FattyAcid) -> &mut f64 {
        match acid {
            FattyAcid::Lauric => &mut self.lauric,
            FattyAcid::Myristic => &mut self.myristic,
            FattyAcid::Palmitic => &mut self.palmitic,
            FattyAcid::Stearic => &mut self.stearic,
            FattyAcid::Ricinoleic => &mut self.ricinoleic,
            FattyAcid::Oleic => &mut self.oleic,
            FattyAcid::Linoleic => &mut self.linoleic,
            FattyAcid::Linolenic => &mut self.linolenic,
        }
    }

    /// Iterate over (acid, fraction) pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (FattyAcid, f64)> + '_ {
        FattyAcid::ALL.iter().map(move |&acid| (acid, self.get(acid)))
    }
}

/// Reference data for one soaping oil
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OilSpec {
    pub name: String,
    pub sap: f64, // NaOH grams per gram of oil at 0% superfat
    pub ins: f64,
    pub fatty_acids: FattyAcidProfile,
}

/// An oil and the mass of it used in a recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OilLine {
    pub oil: OilSpec,
    pub weight: f64, // grams
}

/// Essential oil or powder added at trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveEntry {
    pub name: String,
    pub weight: f64, // grams
}

impl AdditiveEntry {
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            weight,
        }
    }

    /// Named and weighed; anything else is an unfilled form row
    pub fn is_active(&self) -> bool {
        self.weight > 0.0 && !self.name.trim().is_empty()
    }
}

/// Derived soap qualities plus the lye and water quantities
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoapProperties {
    pub hardness: f64,
    pub cleansing: f64,
    pub conditioning: f64,
    pub bubbly: f64,
    pub creamy: f64,
    pub ins: f64,
    pub total_weight: f64,
    pub lye_amount: f64,
    pub water_amount: f64,
}

/// Result of one formulation calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulationResult {
    pub properties: SoapProperties,
    pub fatty_acid_profile: FattyAcidProfile,
    pub description: String,
    pub essential_oils: Vec<AdditiveEntry>,
    pub powders: Vec<AdditiveEntry>,
}

impl FormulationResult {
    /// Same numbers, new description
    pub fn with_description(&self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self.clone()
        }
    }
}

/// Immutable snapshot of everything a calculation reads
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeInput {
    pub oils: Vec<OilLine>,
    pub superfat: f64,       // percent
    pub water_percent: f64,  // percent of oil mass
    pub essential_oils: Vec<AdditiveEntry>,
    pub powders: Vec<AdditiveEntry>,
}

impl RecipeInput {
    pub fn total_weight(&self) -> f64 {
        self.oils.iter().map(|line| line.weight).sum()
    }
}

/// A recipe the user chose to keep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecipe {
    pub id: String,
    pub name: String,
    pub oils: Vec<OilLine>,
    pub superfat: f64,
    pub water_as_percent_of_oils: f64,
    pub essential_oils: Vec<AdditiveEntry>,
    pub powders: Vec<AdditiveEntry>,
    pub results: FormulationResult,
}

/// Water ratio used when a stored recipe carries none
pub const DEFAULT_WATER_PERCENT: f64 = 33.0;

impl SavedRecipe {
    /// Inputs to restore into the working recipe when this one is loaded
    pub fn to_input(&self) -> RecipeInput {
        let water_percent = if self.water_as_percent_of_oils > 0.0 {
            self.water_as_percent_of_oils
        } else {
            DEFAULT_WATER_PERCENT
        };

        RecipeInput {
            oils: self.oils.clone(),
            superfat: self.superfat,
            water_percent,
            essential_oils: self.essential_oils.clone(),
            powders: self.powders.clone(),
        }
    }
}
