pub mod addresses;
pub mod brands;
pub mod cart_items;
pub mod carts;
pub mod categories;
pub mod colors;
pub mod genders;
pub mod guests;
pub mod order_items;
pub mod orders;
pub mod product_images;
pub mod product_variants;
pub mod products;
pub mod sizes;
pub mod users;
pub mod wishlists;

pub use addresses::Entity as Addresses;
pub use brands::Entity as Brands;
pub use cart_items::Entity as CartItems;
pub use carts::Entity as Carts;
pub use categories::Entity as Categories;
pub use colors::Entity as Colors;
pub use genders::Entity as Genders;
pub use guests::Entity as Guests;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use product_images::Entity as ProductImages;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use sizes::Entity as Sizes;
pub use users::Entity as Users;
pub use wishlists::Entity as Wishlists;
