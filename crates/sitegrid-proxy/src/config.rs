//! nginx artifact generation. Pure: no filesystem or process access.

use std::fmt::Write as _;

use sitegrid_core::ProjectNames;

/// A generated route: two subdomain→port mappings and the artifact text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub slug: String,
    pub frontend_domain: String,
    pub backend_domain: String,
    pub frontend_port: u16,
    pub backend_port: u16,
    pub artifact: String,
}

impl RouteConfig {
    /// File name of the artifact in the sites directories.
    pub fn file_name(&self) -> String {
        ProjectNames::for_slug(&self.slug).route_file
    }
}

/// Render the route for `slug` under `base_domain`.
pub fn generate(slug: &str, base_domain: &str, frontend_port: u16, backend_port: u16) -> RouteConfig {
    let names = ProjectNames::for_slug(slug);
    let frontend_domain = names.frontend_domain(base_domain);
    let backend_domain = names.backend_domain(base_domain);

    let mut artifact = format!("# SiteGrid route for {slug}\n\n# Frontend: {frontend_domain}\n");
    server_block(&mut artifact, &frontend_domain, frontend_port, false);
    let _ = write!(artifact, "\n# Backend: {backend_domain}\n");
    server_block(&mut artifact, &backend_domain, backend_port, true);

    RouteConfig {
        slug: slug.to_string(),
        frontend_domain,
        backend_domain,
        frontend_port,
        backend_port,
        artifact,
    }
}

fn server_block(out: &mut String, domain: &str, port: u16, forward_origin: bool) {
    let _ = write!(
        out,
        "server {{
    listen 80;
    server_name {domain};

    location / {{
        proxy_pass http://127.0.0.1:{port};
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection 'upgrade';
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
"
    );
    if forward_origin {
        out.push_str(
            "        proxy_set_header X-Forwarded-Host $host;
        proxy_set_header X-Forwarded-Port $server_port;
",
        );
    }
    out.push_str("    }\n}\n");
}
