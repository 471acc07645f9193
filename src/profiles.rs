use crate::schema::{FarmProfile, HiredService, OwnedImplement, TillageOption};
use std::sync::OnceLock;

pub const ILLINOIS_FARM: &str = "Illinois State Farm";
pub const NORTH_DAKOTA_FARM: &str = "North Dakota State Farm";

/// Used when no profile supplies a soil description.
pub const DEFAULT_SOIL_DESCRIPTION: &str =
    "No soil survey is available for this farm; assume typical soil conditions for the stated location.";

const ILLINOIS_SOIL: &str = "Your soil is predominantly clay-heavy, poorly drained, and prone to ponding, requiring careful tillage to improve water movement and prevent compaction. \
The majority (74.2%) of your land is Reddick clay loam (594A), which holds water for long periods due to its high clay content and slow infiltration rate (0.06 to 0.20 in/hr). \
The water table is extremely shallow (0 to 12 inches), leading to frequent ponding. However, it retains a high amount of moisture (~9.1 inches in the top 60 inches), which is beneficial in dry conditions. \
It is prime farmland only if properly drained, making drainage and aeration a top priority for tillage. \
Andres silt loam (293A) covers 18.8% of your land and is somewhat poorly drained, but more workable than the Reddick clay. \
It has a slightly deeper water table (12 to 24 inches), better drainage, and is classified as prime farmland. However, its low infiltration rate still makes it vulnerable to waterlogging if improperly managed. \
The smallest section (7%) is Ashkum silty clay loam (232A), another poorly drained soil with frequent ponding and a very shallow water table (0 to 12 inches). \
It compacts easily and stays wet for long periods, though it has moderate water-holding capacity (~8.1 inches in the top 60 inches). Like the Reddick soil, it is prime farmland only if drained properly. \
Overall, your soil is highly compactable and holds water too well, creating drainage issues. Tillage should focus on reducing compaction, improving drainage, and maintaining soil structure. \
Deep tillage or strip tillage would be more effective than aggressive plowing, which could worsen compaction. While your soil is naturally fertile, managing water retention and aeration is crucial for crop success.";

fn owned(
    name: &str,
    implement_type: &str,
    working_speed_mph: f64,
    soil_type: &str,
    width_ft: f64,
    operating_cost_per_acre: f64,
    total_cost: Option<f64>,
) -> TillageOption {
    TillageOption::Owned(OwnedImplement {
        name: name.to_string(),
        implement_type: implement_type.to_string(),
        working_speed_mph,
        soil_type: soil_type.to_string(),
        width_ft,
        operating_cost_per_acre,
        total_cost,
    })
}

fn hired(
    name: &str,
    hired_resource: &str,
    cost_per_acre: f64,
    tillage_mechanism: &str,
    estimated_time_hours_per_acre: f64,
    total_cost: Option<f64>,
) -> TillageOption {
    TillageOption::Hired(HiredService {
        name: name.to_string(),
        hired_resource: hired_resource.to_string(),
        cost_per_acre,
        tillage_mechanism: tillage_mechanism.to_string(),
        estimated_time_hours_per_acre,
        total_cost,
    })
}

fn build_profiles() -> Vec<FarmProfile> {
    vec![
        FarmProfile {
            name: ILLINOIS_FARM.to_string(),
            location: "Illinois".to_string(),
            soil_description: ILLINOIS_SOIL.to_string(),
            total_area_acres: Some(15.4),
            tillage_options: vec![
                owned(
                    "No-Till Planting (Farmer Owned)",
                    "16-row No-Till Planter",
                    5.0,
                    "Silty Clay Loam",
                    30.0,
                    55.0,
                    Some(847.0),
                ),
                owned(
                    "High-Speed Disk (Farmer Owned - Secondary Tillage/Seedbed Prep)",
                    "High-Speed Disk (e.g., Salford Halo or similar)",
                    8.0,
                    "Silty Clay Loam",
                    30.0,
                    50.0,
                    Some(770.0),
                ),
                owned(
                    "Conventional Disk Harrow (Farmer Owned - Secondary Tillage)",
                    "Large Tandem Disc Harrow",
                    6.0,
                    "Silty Clay Loam",
                    35.0,
                    60.0,
                    Some(924.0),
                ),
                hired(
                    "Co-op Hired Resource: Custom Deep Rip with Cover Crop Seeding",
                    "Commercial Deep Rip and Cover Crop Service",
                    75.0,
                    "Deep Ripper with Cover Crop Seeder Attachment",
                    0.4,
                    Some(1155.0),
                ),
                hired(
                    "Co-op Hired Resource: Custom Moldboard Plowing",
                    "Commercial Moldboard Plowing Service",
                    90.0,
                    "Large Moldboard Plow",
                    0.5,
                    Some(1386.0),
                ),
            ],
        },
        FarmProfile {
            name: NORTH_DAKOTA_FARM.to_string(),
            location: "North Dakota".to_string(),
            soil_description: String::new(),
            total_area_acres: None,
            tillage_options: vec![
                owned(
                    "No-Till Planting (Farmer Owned)",
                    "Air Drill No-Till Planter",
                    4.5,
                    "Silt Loam",
                    40.0,
                    47.5,
                    None,
                ),
                owned(
                    "Air Seeder with Disc Coulters (Farmer Owned - for Wheat/Small Grains)",
                    "Air Seeder with Independent Disc Coulters (minimal tillage seeding)",
                    5.0,
                    "Silt Loam",
                    50.0,
                    39.0,
                    None,
                ),
                owned(
                    "Vertical Tillage (Farmer Owned - Light Residue Management)",
                    "Light Vertical Tillage Tool (e.g., Sunflower or Landoll type)",
                    6.0,
                    "Silt Loam",
                    35.0,
                    42.5,
                    None,
                ),
                hired(
                    "Co-op Hired Resource: Custom Strip-Till Application",
                    "Commercial Strip-Till Service",
                    55.0,
                    "Strip-Till Implement (8-row or 12-row unit)",
                    0.2,
                    None,
                ),
                hired(
                    "Co-op Hired Resource: Custom Heavy Discing",
                    "Commercial Heavy Discing Service",
                    50.0,
                    "Large Offset Disc Harrow (aggressive residue incorporation)",
                    0.3,
                    None,
                ),
            ],
        },
    ]
}

/// All bundled profiles, in menu order.
pub fn predefined_farms() -> &'static [FarmProfile] {
    static PROFILES: OnceLock<Vec<FarmProfile>> = OnceLock::new();
    PROFILES.get_or_init(build_profiles)
}

pub fn find_profile(name: &str) -> Option<&'static FarmProfile> {
    predefined_farms().iter().find(|profile| profile.name == name)
}

/// Maps a farm-selection menu answer to a profile ("1" and "2" only).
pub fn profile_for_selection(selection: &str) -> Option<&'static FarmProfile> {
    match selection.trim() {
        "1" => find_profile(ILLINOIS_FARM),
        "2" => find_profile(NORTH_DAKOTA_FARM),
        _ => None,
    }
}

impl FarmProfile {
    /// Pretty JSON of the tillage options, as shown to the model and stored
    /// in `FarmInfo::tools_available`.
    pub fn tools_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.tillage_options)
    }

    pub fn soil_or_default(&self) -> &str {
        if self.soil_description.trim().is_empty() {
            DEFAULT_SOIL_DESCRIPTION
        } else {
            &self.soil_description
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TillageOption;

    #[test]
    fn test_selection_digits() {
        assert_eq!(profile_for_selection("1").unwrap().location, "Illinois");
        assert_eq!(profile_for_selection(" 2 ").unwrap().location, "North Dakota");
        assert!(profile_for_selection("3").is_none());
        assert!(profile_for_selection("Illinois").is_none());
    }

    #[test]
    fn test_tools_json_round_trips() {
        let profile = find_profile(ILLINOIS_FARM).unwrap();
        let json = profile.tools_json().unwrap();
        let parsed: Vec<TillageOption> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, profile.tillage_options);
        assert_eq!(parsed.iter().filter(|o| o.is_hired()).count(), 2);
    }

    #[test]
    fn test_illinois_totals_match_area() {
        let profile = find_profile(ILLINOIS_FARM).unwrap();
        for option in &profile.tillage_options {
            let recorded = option.total_cost(None).unwrap();
            let derived = option.cost_per_acre() * profile.total_area_acres.unwrap();
            assert!((recorded - derived).abs() < 1.0, "{}", option.name());
        }
    }

    #[test]
    fn test_empty_soil_falls_back() {
        let profile = find_profile(NORTH_DAKOTA_FARM).unwrap();
        assert_eq!(profile.soil_or_default(), DEFAULT_SOIL_DESCRIPTION);
    }
}
