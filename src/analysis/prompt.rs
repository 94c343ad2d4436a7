use std::fmt::Write as _;

use crate::config::UserProfile;

/// Builds the nutritionist instruction sent alongside the photo.
pub fn build_prompt(profile: &UserProfile, allergy_detection: bool) -> String {
    let mut p = String::from(
        "You are a professional nutritionist and food analyst.\n\
         Analyze this food image and provide detailed nutritional insights.\n\n\
         User Profile:\n",
    );

    if let Some(age) = profile.age {
        let _ = writeln!(p, "- Age: {age} years");
    }
    if let Some(gender) = &profile.gender {
        let _ = writeln!(p, "- Gender: {gender}");
    }
    if let Some(location) = &profile.location {
        let _ = writeln!(p, "- Location: {location}");
    }
    if let (Some(h), Some(w)) = (profile.height_cm, profile.weight_kg) {
        let _ = writeln!(p, "- Height / Weight: {h:.0} cm / {w:.0} kg");
    }
    if let Some(diet) = &profile.diet_type {
        let _ = writeln!(p, "- Diet: {diet}");
    }
    if !profile.dietary_restrictions.is_empty() {
        let _ = writeln!(
            p,
            "- Dietary restrictions: {}",
            profile.dietary_restrictions.join(", ")
        );
    }
    if let Some(goal) = &profile.health_goal {
        let _ = writeln!(p, "- Health goal: {goal}");
    }
    if let Some(activity) = &profile.activity_level {
        let _ = writeln!(p, "- Activity level: {activity}");
    }
    let _ = writeln!(p, "- Daily KCal Target: {} KCal", profile.daily_kcal);
    let _ = writeln!(p, "- Daily Protein Target: {:.0}g", profile.daily_protein_g);
    let _ = writeln!(p, "- Daily Carbs Target: {:.0}g", profile.daily_carbs_g);
    let _ = writeln!(p, "- Daily Fat Target: {:.0}g", profile.daily_fat_g);

    p.push_str(
        "\nPlease analyze this meal and return a JSON response with:\n\
         {\n\
         \x20   \"food_name\": \"Name of the dish (e.g., Chicken Biryani)\",\n\
         \x20   \"estimated_kcal\": <estimated total calories as integer>,\n\
         \x20   \"protein_g\": <estimated protein in grams>,\n\
         \x20   \"carbs_g\": <estimated carbohydrates in grams>,\n\
         \x20   \"fat_g\": <estimated fat in grams>,\n\
         \x20   \"food_score\": <health score 0-100 where 100 is perfectly healthy>,\n\
         \x20   \"ai_insight\": \"<1-2 sentences about this food's nutritional profile>\",\n\
         \x20   \"healthy_tips\": \"<1-2 sentences on how to make this meal healthier>\",\n\
         \x20   \"food_type\": \"<category: vegetarian/non-vegetarian/vegan/etc>\",\n",
    );
    if allergy_detection {
        p.push_str(
            "    \"portion_size\": \"<estimated portion size>\",\n\
             \x20   \"allergens\": [<common allergens likely present, e.g. \"peanuts\", \"dairy\"; empty list if none>]\n",
        );
    } else {
        p.push_str("    \"portion_size\": \"<estimated portion size>\"\n");
    }
    p.push_str(
        "}\n\n\
         Be conservative in calorie estimates. Use regional food nutrition databases when applicable.\n\
         Return ONLY valid JSON, no markdown or extra text.",
    );
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_targets_and_context() {
        let profile = UserProfile {
            gender: Some("Female".into()),
            dietary_restrictions: vec!["gluten-free".into()],
            ..UserProfile::default()
        };
        let p = build_prompt(&profile, false);
        assert!(p.contains("- Age: 35 years"));
        assert!(p.contains("- Location: Mumbai, India"));
        assert!(p.contains("- Gender: Female"));
        assert!(p.contains("- Dietary restrictions: gluten-free"));
        assert!(p.contains("- Daily KCal Target: 2000 KCal"));
        assert!(p.contains("- Daily Fat Target: 65g"));
        assert!(p.contains("\"food_score\""));
        assert!(!p.contains("allergens"));
    }

    #[test]
    fn allergy_detection_adds_field() {
        let p = build_prompt(&UserProfile::default(), true);
        assert!(p.contains("\"allergens\""));
        assert!(p.ends_with("no markdown or extra text."));
    }

    #[test]
    fn unset_context_lines_are_omitted() {
        let profile = UserProfile {
            age: None,
            location: None,
            ..UserProfile::default()
        };
        let p = build_prompt(&profile, false);
        assert!(!p.contains("- Age:"));
        assert!(!p.contains("- Location:"));
        assert!(!p.contains("Height"));
    }
}
