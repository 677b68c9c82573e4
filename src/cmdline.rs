//! Interpretation of the booted OS's own `lk2nd.*` kernel command-line
//! directives. This module only parses them into a small struct; acting on
//! them (framebuffer handoff, ramoops carving, spin-table programming) is
//! hardware/kernel-loader territory.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimplefbFlags {
    pub autorefresh: bool,
    pub xrgb8888: bool,
    pub rgb565: bool,
    pub relocate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CmdlineDirectives {
    pub pass_simplefb: Option<SimplefbFlags>,
    pub pass_ramoops: Option<bool>, // Some(true) => zap
    pub spin_table_force: bool,
}

impl CmdlineDirectives {
    pub fn parse(append: &str) -> CmdlineDirectives {
        let mut directives = CmdlineDirectives::default();

        for token in append.split_whitespace() {
            let (key, value) = match token.split_once('=') {
                Some((k, v)) => (k, Some(v)),
                None => (token, None),
            };

            match key {
                "lk2nd.pass-simplefb" => {
                    let mut flags = SimplefbFlags::default();
                    if let Some(value) = value {
                        for flag in value.split(',') {
                            match flag {
                                "autorefresh" => flags.autorefresh = true,
                                "xrgb8888" => flags.xrgb8888 = true,
                                "rgb565" => flags.rgb565 = true,
                                "relocate" => flags.relocate = true,
                                other => log::debug!("cmdline: ignoring unknown simplefb flag '{}'", other),
                            }
                        }
                    }
                    directives.pass_simplefb = Some(flags);
                }
                "lk2nd.pass-ramoops" => {
                    directives.pass_ramoops = Some(value == Some("zap"));
                }
                "lk2nd.spin-table" => {
                    directives.spin_table_force = value == Some("force");
                }
                _ => {}
            }
        }

        directives
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simplefb_with_combined_flags() {
        let d = CmdlineDirectives::parse("root=/dev/sda1 lk2nd.pass-simplefb=autorefresh,xrgb8888 rw");
        let flags = d.pass_simplefb.unwrap();
        assert!(flags.autorefresh);
        assert!(flags.xrgb8888);
        assert!(!flags.rgb565);
    }

    #[test]
    fn bare_simplefb_directive_has_no_flags_set() {
        let d = CmdlineDirectives::parse("lk2nd.pass-simplefb");
        assert_eq!(d.pass_simplefb, Some(SimplefbFlags::default()));
    }

    #[test]
    fn ramoops_zap_and_plain() {
        assert_eq!(
            CmdlineDirectives::parse("lk2nd.pass-ramoops=zap").pass_ramoops,
            Some(true)
        );
        assert_eq!(
            CmdlineDirectives::parse("lk2nd.pass-ramoops").pass_ramoops,
            Some(false)
        );
    }

    #[test]
    fn spin_table_force() {
        assert!(CmdlineDirectives::parse("lk2nd.spin-table=force").spin_table_force);
        assert!(!CmdlineDirectives::parse("other=thing").spin_table_force);
    }

    #[test]
    fn unrelated_tokens_are_ignored() {
        let d = CmdlineDirectives::parse("console=ttyMSM0 root=/dev/sda1 rw");
        assert_eq!(d, CmdlineDirectives::default());
    }
}
