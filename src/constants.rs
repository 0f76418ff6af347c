//! Centralized constants for permissions, paths, and names.

/// Name of the installed binary, also used for completion scripts.
pub const BIN_NAME: &str = "ocm";

/// Directory name under the platform config dir holding the default config.
pub const CONFIG_DIR_NAME: &str = "openvpn-cred-management";

/// File name of the default config.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Permission mode for the config file.
pub const CONFIG_FILE_MODE: u32 = 0o600;

/// Known easyrsa install locations, probed in order when writing an example config.
pub const EASY_RSA_CANDIDATES: &[&str] = &[
    "/usr/share/easy-rsa/3/easyrsa", // Fedora
    "/usr/share/easy-rsa/easyrsa",   // Alpine, Debian
    "/usr/bin/easyrsa",              // Arch
];

/// PKI sub-directory holding issued certificates.
pub const PKI_ISSUED_DIR: &str = "issued";

/// PKI sub-directory holding private keys.
pub const PKI_PRIVATE_DIR: &str = "private";

/// Stem of the CA key in the private directory; never a user.
pub const CA_KEY_STEM: &str = "ca";

/// Lock file created inside the PKI directory during mutations.
pub const PKI_LOCK_FILE: &str = ".ocm.lock";

/// File extension of issued certificates.
pub const CERT_EXTENSION: &str = "crt";

/// File extension of private keys.
pub const KEY_EXTENSION: &str = "key";

/// Certificates expiring within this many days are flagged in listings.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

/// Permission mode for certificates written into packages.
pub const PACKAGE_CERT_MODE: u32 = 0o644;

/// Permission mode for keys written into packages.
pub const PACKAGE_KEY_MODE: u32 = 0o600;

/// File extension of generated packages.
pub const PACKAGE_EXTENSION: &str = "zip";

/// Shell used to run custom scripts.
pub const SCRIPT_SHELL: &str = "sh";

/// Install locations of the completion scripts.
pub const INSTALL_BASH_COMPLETION: &str = "/usr/share/bash-completion/completions/ocm";
pub const INSTALL_ZSH_COMPLETION: &str = "/usr/share/zsh/site-functions/_ocm";
pub const INSTALL_FISH_COMPLETION: &str = "/usr/share/fish/vendor_completions.d/ocm.fish";

/// Permission mode for installed completion scripts.
pub const INSTALL_COMPLETION_MODE: u32 = 0o644;
