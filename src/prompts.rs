pub const TABLE: &str = include_str!("../data/prompts/table.txt");
pub const TABLE_IN_ROOM: &str = include_str!("../data/prompts/table_in_room.txt");
pub const LEGS: &str = include_str!("../data/prompts/legs.txt");
pub const STUDIO: &str = include_str!("../data/prompts/studio.txt");
pub const COMBINE: &str = include_str!("../data/prompts/combine.txt");

/// Replace `{{key}}` placeholders in a template string.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.trim_end().to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{{{}}}}}", key), value);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_single_var() {
        assert_eq!(
            render("Hello {{name}}!", &[("name", "world")]),
            "Hello world!"
        );
    }

    #[test]
    fn test_render_strips_trailing_newline() {
        assert_eq!(render("line\n", &[]), "line");
    }

    #[test]
    fn test_prompts_are_non_empty() {
        assert!(!TABLE.is_empty());
        assert!(!TABLE_IN_ROOM.is_empty());
        assert!(!STUDIO.is_empty());
        assert!(!COMBINE.is_empty());
    }

    #[test]
    fn test_legs_has_placeholder() {
        assert!(LEGS.contains("{{legs}}"));
    }

    #[test]
    fn test_only_room_template_mentions_image_4() {
        assert!(TABLE_IN_ROOM.contains("image 4"));
        assert!(!TABLE.contains("image 4"));
    }
}
