use crate::Id;
use std::collections::BTreeSet;

/// Hands out names that collide neither with each other nor with a set of
/// names reserved up front.
#[derive(Clone, Debug, Default)]
pub struct NameGenerator {
    taken: BTreeSet<Id>,
}

impl NameGenerator {
    pub fn with_prev_defined_names<I: IntoIterator<Item = Id>>(reserved: I) -> Self {
        Self {
            taken: reserved.into_iter().collect(),
        }
    }

    /// `prefix` if it is free, otherwise `prefix_1`, `prefix_2`, ... for
    /// the first free suffix.
    pub fn gen_name<S: Into<Id>>(&mut self, prefix: S) -> Id {
        let prefix = prefix.into();
        let mut name = prefix;
        let mut suffix = 0usize;
        while self.taken.contains(&name) {
            suffix += 1;
            name = Id::from(format!("{prefix}_{suffix}"));
        }
        self.taken.insert(name);
        name
    }
}

#[cfg(test)]
mod tests {
    use super::NameGenerator;
    use crate::Id;

    #[test]
    fn avoids_reserved_names() {
        let mut names = NameGenerator::with_prev_defined_names([Id::from("v"), Id::from("v_2")]);
        assert_eq!(names.gen_name("v"), "v_1");
        assert_eq!(names.gen_name("v"), "v_3");
        assert_eq!(names.gen_name("w"), "w");
        assert_eq!(names.gen_name("w"), "w_1");
    }
}
