//! Names a pool file is delivered and archived under.

use config::{NameOptions, RenameRules};

/// Name after the local options: `rename`, `basename`, `extension`,
/// `prefix del`, `prefix add`, then case.
#[must_use]
pub fn local_name(options: &NameOptions, rules: &RenameRules, pool_name: &str) -> String {
    let mut name = match &options.rename {
        Some(rule) => rules
            .apply(rule, pool_name)
            .unwrap_or_else(|| pool_name.to_string()),
        None => pool_name.to_string(),
    };
    if let Some(dot) = name.find('.').filter(|_| options.basename) {
        name.truncate(dot);
    }
    if let Some(extension) = &options.extension {
        if let Some(dot) = name.rfind('.') {
            name.truncate(dot);
        }
        if !extension.is_empty() {
            name.push('.');
            name.push_str(extension.trim_start_matches('.'));
        }
    }
    if let Some(prefix) = &options.prefix_del {
        if let Some(rest) = name.strip_prefix(prefix.as_str()) {
            name = rest.to_string();
        }
    }
    if let Some(prefix) = &options.prefix_add {
        name.insert_str(0, prefix);
    }
    if options.toupper {
        name = name.to_uppercase();
    } else if options.tolower {
        name = name.to_lowercase();
    }
    if name.is_empty() {
        pool_name.to_string()
    } else {
        name
    }
}

/// Name on the remote side: `trans_rename` applied to the local name.
#[must_use]
pub fn remote_name(options: &NameOptions, rules: &RenameRules, local: &str) -> String {
    options
        .trans_rename
        .as_ref()
        .and_then(|rule| rules.apply(rule, local))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| local.to_string())
}

/// The local name options in effect, as written in DIR_CONFIG.
#[must_use]
pub fn conversion(options: &NameOptions) -> String {
    let mut parts = Vec::new();
    if let Some(rule) = &options.rename {
        parts.push(format!("rename {rule}"));
    }
    if options.basename {
        parts.push("basename".to_string());
    }
    if let Some(extension) = &options.extension {
        parts.push(format!("extension {extension}"));
    }
    if let Some(prefix) = &options.prefix_del {
        parts.push(format!("prefix del {prefix}"));
    }
    if let Some(prefix) = &options.prefix_add {
        parts.push(format!("prefix add {prefix}"));
    }
    if options.toupper {
        parts.push("toupper".to_string());
    } else if options.tolower {
        parts.push("tolower".to_string());
    }
    parts.join(";")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use config::Diagnostics;

    use super::*;

    fn rules() -> RenameRules {
        let mut diagnostics = Diagnostics::new();
        RenameRules::parse(
            "[to_out]\n*.dat out_\\1.dat\n\n[stamp]\n* \\1.sent\n",
            Path::new("rename.rule"),
            &mut diagnostics,
        )
    }

    #[test]
    fn identity_options_keep_the_name() {
        let options = NameOptions::default();
        assert_eq!(local_name(&options, &rules(), "x.dat"), "x.dat");
        assert_eq!(remote_name(&options, &rules(), "x.dat"), "x.dat");
    }

    #[test]
    fn rename_rule_runs_before_case() {
        let options = NameOptions {
            rename: Some("to_out".into()),
            toupper: true,
            ..NameOptions::default()
        };
        assert_eq!(local_name(&options, &rules(), "x.dat"), "OUT_X.DAT");
    }

    #[test]
    fn basename_and_extension() {
        let basename = NameOptions {
            basename: true,
            ..NameOptions::default()
        };
        assert_eq!(local_name(&basename, &rules(), "a.b.c"), "a");

        let extension = NameOptions {
            extension: Some("txt".into()),
            ..NameOptions::default()
        };
        assert_eq!(local_name(&extension, &rules(), "a.b.c"), "a.b.txt");
        assert_eq!(local_name(&extension, &rules(), "plain"), "plain.txt");
    }

    #[test]
    fn prefixes_are_swapped() {
        let options = NameOptions {
            prefix_del: Some("tmp_".into()),
            prefix_add: Some("AFD_".into()),
            ..NameOptions::default()
        };
        assert_eq!(local_name(&options, &rules(), "tmp_x.dat"), "AFD_x.dat");
        assert_eq!(local_name(&options, &rules(), "x.dat"), "AFD_x.dat");
        assert_eq!(conversion(&options), "prefix del tmp_;prefix add AFD_");
    }

    #[test]
    fn trans_rename_changes_the_remote_name_only() {
        let options = NameOptions {
            trans_rename: Some("stamp".into()),
            ..NameOptions::default()
        };
        let local = local_name(&options, &rules(), "x.dat");
        assert_eq!(local, "x.dat");
        assert_eq!(remote_name(&options, &rules(), &local), "x.dat.sent");
    }

    #[test]
    fn unknown_rule_falls_back_to_the_pool_name() {
        let options = NameOptions {
            rename: Some("missing".into()),
            ..NameOptions::default()
        };
        assert_eq!(local_name(&options, &rules(), "x.dat"), "x.dat");
    }
}
