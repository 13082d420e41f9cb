use crate::config::SecurityConfig;
use http::{HeaderMap, HeaderValue};
use uuid::Uuid;

/// Hardening headers attached to every response, allow or deny
#[derive(Debug, Clone)]
pub struct ResponseHardening {
    csp_enable_nonce: bool,
    csp_enable_strict_dynamic: bool,
    enable_hsts: bool,
}

impl ResponseHardening {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            csp_enable_nonce: config.csp_enable_nonce,
            csp_enable_strict_dynamic: config.csp_enable_strict_dynamic,
            enable_hsts: config.enable_hsts,
        }
    }

    pub fn nonce_enabled(&self) -> bool {
        self.csp_enable_nonce
    }

    /// Fresh per-response nonce for the CSP inline-script exception
    pub fn generate_nonce(&self) -> Option<String> {
        if self.csp_enable_nonce {
            Some(Uuid::new_v4().simple().to_string())
        } else {
            None
        }
    }

    /// Build a strict but compatible CSP string.
    ///
    /// No `unsafe-inline`, no `unsafe-eval`; the only inline-script exception
    /// is the per-response nonce.
    pub fn build_csp(&self, nonce: Option<&str>) -> String {
        let mut script_src = String::from("'self'");
        if self.csp_enable_nonce {
            if let Some(nonce) = nonce {
                script_src.push_str(&format!(" 'nonce-{}'", nonce));
                if self.csp_enable_strict_dynamic {
                    script_src.push_str(" 'strict-dynamic'");
                }
            }
        }

        format!(
            "default-src 'self'; script-src {}; style-src 'self'; img-src 'self' data:; \
             connect-src 'self'; object-src 'none'; base-uri 'self'; frame-src 'none'; \
             frame-ancestors 'none'",
            script_src
        )
    }

    /// Attach the hardening header set to a response
    pub fn apply(&self, headers: &mut HeaderMap, nonce: Option<&str>) {
        headers.insert(
            "X-Content-Type-Options",
            HeaderValue::from_static("nosniff"),
        );
        headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
        headers.insert(
            "Referrer-Policy",
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
        headers.insert(
            "Cross-Origin-Opener-Policy",
            HeaderValue::from_static("same-origin"),
        );
        headers.insert(
            "Cross-Origin-Resource-Policy",
            HeaderValue::from_static("same-origin"),
        );
        headers.insert(
            "Permissions-Policy",
            HeaderValue::from_static(
                "geolocation=(), microphone=(), camera=(), payment=(), usb=()",
            ),
        );

        if let Ok(csp) = HeaderValue::from_str(&self.build_csp(nonce)) {
            headers.insert("Content-Security-Policy", csp);
        }

        if self.enable_hsts {
            // 2 years, include subdomains, allow preload
            headers.insert(
                "Strict-Transport-Security",
                HeaderValue::from_static("max-age=63072000; includeSubDomains; preload"),
            );
        }
    }
}
