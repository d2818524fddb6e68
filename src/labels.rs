// IntelliPest 🌿 AGPL-3.0 License

//! Pest class taxonomy.
//!
//! The label table is fixed and ordered to match the model's output index
//! order. All deployed student models share this 11-class head.

use std::fmt;
use std::str::FromStr;

/// Pest and crop-health categories the classifier distinguishes.
///
/// Variant order is the model output index order and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PestClass {
    /// Fall armyworm damage on sugarcane leaves.
    Armyworm,
    /// No pest damage detected.
    Healthy,
    /// Damage caused by internode borer.
    InternodeBorer,
    /// Mealy bug infestation.
    MealyBug,
    /// Pink borer damage.
    PinkBorer,
    /// Physical damage caused by porcupines.
    PorcupineDamage,
    /// Damage caused by rats.
    RatDamage,
    /// Root borer infestation.
    RootBorer,
    /// Stalk borer damage.
    StalkBorer,
    /// Termite infestation damage.
    Termite,
    /// Top shoot borer damage.
    TopBorer,
}

/// All classes in model output index order.
pub const ALL_CLASSES: [PestClass; 11] = [
    PestClass::Armyworm,
    PestClass::Healthy,
    PestClass::InternodeBorer,
    PestClass::MealyBug,
    PestClass::PinkBorer,
    PestClass::PorcupineDamage,
    PestClass::RatDamage,
    PestClass::RootBorer,
    PestClass::StalkBorer,
    PestClass::Termite,
    PestClass::TopBorer,
];

/// Number of classes in the deployed taxonomy.
pub const CLASS_COUNT: usize = ALL_CLASSES.len();

impl PestClass {
    /// Human-readable name shown to users.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Armyworm => "Armyworm",
            Self::Healthy => "Healthy",
            Self::InternodeBorer => "Internode Borer",
            Self::MealyBug => "Mealy Bug",
            Self::PinkBorer => "Pink Borer",
            Self::PorcupineDamage => "Porcupine Damage",
            Self::RatDamage => "Rat Damage",
            Self::RootBorer => "Root Borer",
            Self::StalkBorer => "Stalk Borer",
            Self::Termite => "Termite",
            Self::TopBorer => "Top Borer",
        }
    }

    /// One-line description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Armyworm => "Fall armyworm damage on sugarcane leaves",
            Self::Healthy => "No pest damage detected - healthy crop",
            Self::InternodeBorer => "Damage caused by internode borer",
            Self::MealyBug => "Mealy bug infestation",
            Self::PinkBorer => "Pink borer damage on sugarcane",
            Self::PorcupineDamage => "Physical damage caused by porcupines",
            Self::RatDamage => "Damage caused by rats",
            Self::RootBorer => "Root borer infestation",
            Self::StalkBorer => "Stalk borer damage",
            Self::Termite => "Termite infestation damage",
            Self::TopBorer => "Top shoot borer damage",
        }
    }

    /// Look up a class by model output index.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        ALL_CLASSES.get(index).copied()
    }

    /// Label for a model output index.
    ///
    /// Out-of-range indices decode to `Unknown_<index>` rather than failing,
    /// so a model/table mismatch degrades instead of crashing.
    #[must_use]
    pub fn label(index: usize) -> String {
        Self::from_index(index).map_or_else(
            || format!("Unknown_{index}"),
            |c| c.display_name().to_string(),
        )
    }
}

impl fmt::Display for PestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for PestClass {
    type Err = ClassParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_CLASSES
            .iter()
            .find(|c| c.display_name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| ClassParseError(s.to_string()))
    }
}

/// Error returned when parsing an unknown class name.
#[derive(Debug, Clone)]
pub struct ClassParseError(String);

impl fmt::Display for ClassParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown pest class '{}'", self.0)
    }
}

impl std::error::Error for ClassParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_count() {
        assert_eq!(CLASS_COUNT, 11);
    }

    #[test]
    fn test_from_index() {
        assert_eq!(PestClass::from_index(0), Some(PestClass::Armyworm));
        assert_eq!(PestClass::from_index(1), Some(PestClass::Healthy));
        assert_eq!(PestClass::from_index(10), Some(PestClass::TopBorer));
        assert_eq!(PestClass::from_index(11), None);
    }

    #[test]
    fn test_label_fallback() {
        assert_eq!(PestClass::label(3), "Mealy Bug");
        assert_eq!(PestClass::label(42), "Unknown_42");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("healthy".parse::<PestClass>().unwrap(), PestClass::Healthy);
        assert_eq!(
            "Top Borer".parse::<PestClass>().unwrap(),
            PestClass::TopBorer
        );
        assert!("locust".parse::<PestClass>().is_err());
    }
}
