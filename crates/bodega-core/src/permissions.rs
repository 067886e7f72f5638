//! # Permissions
//!
//! The canonical authorization tokens and the set a session carries.
//!
//! Token strings are persisted verbatim in the `permissions` table; the
//! enum below is the typed face of that table.
//!
//! ## Check Flow
//! ```text
//! record_sale(session, ...)
//!      │
//!      ▼
//! session.require(PermissionToken::VentasCrear)
//!      │
//!      ├── token in set ──► Ok(())      continue with the transaction
//!      │
//!      └── missing ───────► Err(PermissionDenied { "ventas_crear" })
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Permission Token
// =============================================================================

/// One of the 21 canonical permission tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionToken {
    ClientesVer,
    ClientesCrear,
    ClientesEditar,
    ClientesEliminar,
    ArticulosVer,
    ArticulosCrear,
    ArticulosEditar,
    ArticulosEliminar,
    ProveedoresVer,
    ProveedoresCrear,
    ProveedoresEditar,
    ProveedoresEliminar,
    VentasVer,
    VentasCrear,
    InventarioVer,
    InventarioIngresos,
    ReportesVentas,
    UsuariosVer,
    UsuariosCrear,
    UsuariosEditar,
    UsuariosAsignarRoles,
}

impl PermissionToken {
    pub const ALL: [PermissionToken; 21] = [
        PermissionToken::ClientesVer,
        PermissionToken::ClientesCrear,
        PermissionToken::ClientesEditar,
        PermissionToken::ClientesEliminar,
        PermissionToken::ArticulosVer,
        PermissionToken::ArticulosCrear,
        PermissionToken::ArticulosEditar,
        PermissionToken::ArticulosEliminar,
        PermissionToken::ProveedoresVer,
        PermissionToken::ProveedoresCrear,
        PermissionToken::ProveedoresEditar,
        PermissionToken::ProveedoresEliminar,
        PermissionToken::VentasVer,
        PermissionToken::VentasCrear,
        PermissionToken::InventarioVer,
        PermissionToken::InventarioIngresos,
        PermissionToken::ReportesVentas,
        PermissionToken::UsuariosVer,
        PermissionToken::UsuariosCrear,
        PermissionToken::UsuariosEditar,
        PermissionToken::UsuariosAsignarRoles,
    ];

    /// The persisted token string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionToken::ClientesVer => "clientes_ver",
            PermissionToken::ClientesCrear => "clientes_crear",
            PermissionToken::ClientesEditar => "clientes_editar",
            PermissionToken::ClientesEliminar => "clientes_eliminar",
            PermissionToken::ArticulosVer => "articulos_ver",
            PermissionToken::ArticulosCrear => "articulos_crear",
            PermissionToken::ArticulosEditar => "articulos_editar",
            PermissionToken::ArticulosEliminar => "articulos_eliminar",
            PermissionToken::ProveedoresVer => "proveedores_ver",
            PermissionToken::ProveedoresCrear => "proveedores_crear",
            PermissionToken::ProveedoresEditar => "proveedores_editar",
            PermissionToken::ProveedoresEliminar => "proveedores_eliminar",
            PermissionToken::VentasVer => "ventas_ver",
            PermissionToken::VentasCrear => "ventas_crear",
            PermissionToken::InventarioVer => "inventario_ver",
            PermissionToken::InventarioIngresos => "inventario_ingresos",
            PermissionToken::ReportesVentas => "reportes_ventas",
            PermissionToken::UsuariosVer => "usuarios_ver",
            PermissionToken::UsuariosCrear => "usuarios_crear",
            PermissionToken::UsuariosEditar => "usuarios_editar",
            PermissionToken::UsuariosAsignarRoles => "usuarios_asignar_roles",
        }
    }

    /// Module the token belongs to (the prefix before the first `_`).
    pub fn module(&self) -> &'static str {
        let s = self.as_str();
        match s.find('_') {
            Some(idx) => &s[..idx],
            None => s,
        }
    }

    /// Human description stored next to the token.
    pub fn description(&self) -> &'static str {
        match self {
            PermissionToken::ClientesVer => "Ver clientes",
            PermissionToken::ClientesCrear => "Crear clientes",
            PermissionToken::ClientesEditar => "Editar clientes",
            PermissionToken::ClientesEliminar => "Eliminar clientes",
            PermissionToken::ArticulosVer => "Ver artículos",
            PermissionToken::ArticulosCrear => "Crear artículos",
            PermissionToken::ArticulosEditar => "Editar artículos y tasas",
            PermissionToken::ArticulosEliminar => "Eliminar artículos",
            PermissionToken::ProveedoresVer => "Ver proveedores",
            PermissionToken::ProveedoresCrear => "Crear proveedores",
            PermissionToken::ProveedoresEditar => "Editar proveedores",
            PermissionToken::ProveedoresEliminar => "Eliminar proveedores",
            PermissionToken::VentasVer => "Ver ventas",
            PermissionToken::VentasCrear => "Registrar y anular ventas",
            PermissionToken::InventarioVer => "Ver inventario",
            PermissionToken::InventarioIngresos => "Registrar ingresos de mercancía",
            PermissionToken::ReportesVentas => "Ver reportes de ventas",
            PermissionToken::UsuariosVer => "Ver usuarios y auditoría",
            PermissionToken::UsuariosCrear => "Crear usuarios",
            PermissionToken::UsuariosEditar => "Editar usuarios",
            PermissionToken::UsuariosAsignarRoles => "Asignar roles y permisos",
        }
    }
}

impl fmt::Display for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionToken {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PermissionToken::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("permission", format!("unknown token '{}'", s))
            })
    }
}

// =============================================================================
// Permission Set
// =============================================================================

/// The tokens granted to a role, as loaded for a session.
///
/// Token names read from the store that are not canonical are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet(BTreeSet<PermissionToken>);

impl PermissionSet {
    pub fn new() -> Self {
        PermissionSet(BTreeSet::new())
    }

    /// Every canonical token.
    pub fn all() -> Self {
        PermissionToken::ALL.iter().copied().collect()
    }

    /// Builds a set from persisted token names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|n| n.as_ref().parse::<PermissionToken>().ok())
            .collect()
    }

    pub fn contains(&self, token: PermissionToken) -> bool {
        self.0.contains(&token)
    }

    /// Returns `true` if the token was not present.
    pub fn insert(&mut self, token: PermissionToken) -> bool {
        self.0.insert(token)
    }

    pub fn remove(&mut self, token: PermissionToken) -> bool {
        self.0.remove(&token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PermissionToken> + '_ {
        self.0.iter().copied()
    }

    /// Result-returning check used at the entry of privileged operations.
    pub fn check(&self, token: PermissionToken) -> CoreResult<()> {
        if self.contains(token) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied {
                permission: token.as_str().to_string(),
            })
        }
    }
}

impl FromIterator<PermissionToken> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = PermissionToken>>(iter: T) -> Self {
        PermissionSet(iter.into_iter().collect())
    }
}

// =============================================================================
// Permission Checker
// =============================================================================

/// Capability to answer "may the current actor do X?".
///
/// Implemented by `Session`; consumed by every privileged repository method.
pub trait PermissionChecker {
    fn has_permission(&self, token: PermissionToken) -> bool;

    fn require_permission(&self, token: PermissionToken) -> CoreResult<()> {
        if self.has_permission(token) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied {
                permission: token.as_str().to_string(),
            })
        }
    }
}

impl PermissionChecker for PermissionSet {
    fn has_permission(&self, token: PermissionToken) -> bool {
        self.contains(token)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
