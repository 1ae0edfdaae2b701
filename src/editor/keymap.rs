use crate::models::Direction;

/// What a key press means for the tree when nothing is being edited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Navigate(Direction),
    AddChild,
    AddSibling,
    BeginEdit,
    Delete,
    Cancel,
}

/// Map a `KeyboardEvent.key` value to a tree action.
pub fn action_for_key(key: &str) -> Option<KeyAction> {
    let action = match key {
        "ArrowRight" => KeyAction::Navigate(Direction::FirstChild),
        "ArrowLeft" => KeyAction::Navigate(Direction::Parent),
        "ArrowUp" => KeyAction::Navigate(Direction::PrevSibling),
        "ArrowDown" => KeyAction::Navigate(Direction::NextSibling),
        "Tab" => KeyAction::AddChild,
        "Enter" => KeyAction::AddSibling,
        "F2" => KeyAction::BeginEdit,
        "Delete" | "Backspace" => KeyAction::Delete,
        "Escape" => KeyAction::Cancel,
        _ => return None,
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arrow_keys_map_to_directions() {
        assert_eq!(
            action_for_key("ArrowRight"),
            Some(KeyAction::Navigate(Direction::FirstChild))
        );
        assert_eq!(
            action_for_key("ArrowUp"),
            Some(KeyAction::Navigate(Direction::PrevSibling))
        );
    }

    #[test]
    fn test_backspace_and_delete_both_delete() {
        assert_eq!(action_for_key("Backspace"), Some(KeyAction::Delete));
        assert_eq!(action_for_key("Delete"), Some(KeyAction::Delete));
    }

    #[test]
    fn test_unbound_key() {
        assert_eq!(action_for_key("a"), None);
    }
}
