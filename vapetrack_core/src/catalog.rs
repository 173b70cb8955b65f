//! Built-in reward catalog.
//!
//! Rewards are fixed configuration: users can buy and equip them but never
//! edit them.

use crate::types::{Reward, RewardCategory};
use once_cell::sync::Lazy;

/// Cached catalog, built once
static REWARD_CATALOG: Lazy<Vec<Reward>> = Lazy::new(build_reward_catalog);

/// All rewards in shop order
pub fn rewards() -> &'static [Reward] {
    &REWARD_CATALOG
}

/// Look up a reward by id
pub fn find_reward(id: &str) -> Option<&'static Reward> {
    REWARD_CATALOG.iter().find(|r| r.id == id)
}

/// Rewards of one category, cheapest first
pub fn rewards_in(category: RewardCategory) -> impl Iterator<Item = &'static Reward> {
    REWARD_CATALOG.iter().filter(move |r| r.category == category)
}

fn build_reward_catalog() -> Vec<Reward> {
    use RewardCategory::*;

    vec![
        Reward {
            id: "icon_star",
            name: "Star Icon",
            category: Icon,
            cost: 500,
            description: "Shiny star profile icon",
        },
        Reward {
            id: "icon_fire",
            name: "Fire Icon",
            category: Icon,
            cost: 1000,
            description: "Hot fire profile icon",
        },
        Reward {
            id: "icon_cloud",
            name: "Cloud Icon",
            category: Icon,
            cost: 1500,
            description: "Fluffy cloud profile icon",
        },
        Reward {
            id: "icon_rainbow",
            name: "Rainbow Icon",
            category: Icon,
            cost: 2500,
            description: "Colorful rainbow icon",
        },
        Reward {
            id: "icon_bear",
            name: "Cute Bear",
            category: Icon,
            cost: 3000,
            description: "Adorable teddy bear icon",
        },
        Reward {
            id: "icon_rocket",
            name: "Rocket",
            category: Icon,
            cost: 4000,
            description: "To the moon!",
        },
        Reward {
            id: "icon_gangster_bear",
            name: "Cool Bear",
            category: Icon,
            cost: 5000,
            description: "Gangster teddy bear",
        },
        Reward {
            id: "icon_crown",
            name: "Crown Icon",
            category: Icon,
            cost: 6000,
            description: "Royal crown icon",
        },
        Reward {
            id: "border_gold",
            name: "Gold Border",
            category: Border,
            cost: 7500,
            description: "Shining gold profile border",
        },
        Reward {
            id: "border_rainbow",
            name: "Rainbow Border",
            category: Border,
            cost: 10000,
            description: "Animated rainbow border",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_unique() {
        let ids: HashSet<_> = rewards().iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), rewards().len());
    }

    #[test]
    fn test_find_reward() {
        let reward = find_reward("border_gold").unwrap();
        assert_eq!(reward.cost, 7500);
        assert_eq!(reward.category, RewardCategory::Border);
        assert!(find_reward("effect_sparkle").is_none());
    }

    #[test]
    fn test_rewards_in_category() {
        assert_eq!(rewards_in(RewardCategory::Icon).count(), 8);
        assert_eq!(rewards_in(RewardCategory::Border).count(), 2);
    }
}
