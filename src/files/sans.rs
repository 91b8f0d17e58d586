//! Certificate signing request configuration
//!
//! MicroK8s regenerates its server certificates from
//! `$SNAP_DATA/certs/csr.conf.template`. Extra SANs are written into the
//! `[ alt_names ]` section of that file together with the names and
//! addresses every API server certificate needs.

use minijinja::{context, Environment};

use crate::Error;

/// OpenSSL request configuration template loaded at compile time
const CSR_CONF_TEMPLATE: &str = include_str!("../../templates/csr.conf.template.j2");

/// IP SANs always present on the API server certificate
pub const BUILTIN_SAN_IPS: [&str; 2] = ["127.0.0.1", "10.152.183.1"];

/// DNS SANs always present on the API server certificate
pub const BUILTIN_SAN_NAMES: [&str; 5] = [
    "kubernetes",
    "kubernetes.default",
    "kubernetes.default.svc",
    "kubernetes.default.svc.cluster",
    "kubernetes.default.svc.cluster.local",
];

/// Render the CSR configuration for the given extra SANs.
///
/// Returns `None` when neither names nor IPs are requested, in which case
/// the certificate configuration must be left alone. Otherwise the built-in
/// entries are appended after the requested ones and each section is
/// numbered from 1 in order.
pub fn render_csr_config(extra_sans: &[String], extra_ips: &[String]) -> Result<Option<String>, Error> {
    if extra_sans.is_empty() && extra_ips.is_empty() {
        return Ok(None);
    }

    let sans: Vec<&str> = extra_sans
        .iter()
        .map(String::as_str)
        .chain(BUILTIN_SAN_NAMES)
        .collect();
    let ips: Vec<&str> = extra_ips
        .iter()
        .map(String::as_str)
        .chain(BUILTIN_SAN_IPS)
        .collect();

    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.add_template("csr.conf", CSR_CONF_TEMPLATE)
        .map_err(|e| Error::Template(e.to_string()))?;
    let rendered = env
        .get_template("csr.conf")
        .and_then(|tmpl| tmpl.render(context! { sans => sans, ips => ips }))
        .map_err(|e| Error::Template(e.to_string()))?;

    Ok(Some(rendered))
}
